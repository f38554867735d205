//! Single-writer recompute worker.
//!
//! One task owns the [`Orchestrator`]. Requests arrive on a queue; whatever is
//! queued when a run starts is served by that run. There is never more than
//! one recompute in flight, so two runs can not race each other's writes.

use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::orchestrator::{Orchestrator, RecomputeStats};
use crate::store::MemberStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Interval, MissedTickBehavior};
use tracing::{debug, error, info};

/// Why a recompute was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecomputeTrigger {
    /// A material member change
    Change,
    /// Administrative call
    Manual,
    /// Periodic schedule
    Schedule,
    /// The change feed dropped events
    Lagged,
    /// The previous run discarded stale writes
    Stale,
}

type Reply = oneshot::Sender<std::result::Result<RecomputeStats, String>>;

struct Request {
    trigger: RecomputeTrigger,
    reply: Option<Reply>,
}

/// Cheap handle for queueing recomputes.
#[derive(Clone)]
pub struct RecomputeHandle {
    tx: mpsc::UnboundedSender<Request>,
}

impl RecomputeHandle {
    /// Queue a recompute without waiting for it.
    pub fn schedule(&self, trigger: RecomputeTrigger) -> Result<()> {
        self.tx
            .send(Request {
                trigger,
                reply: None,
            })
            .map_err(|_| Error::WorkerClosed)
    }

    /// Queue a recompute and wait for the run that serves it.
    pub async fn recompute_now(&self) -> Result<RecomputeStats> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Request {
                trigger: RecomputeTrigger::Manual,
                reply: Some(reply),
            })
            .map_err(|_| Error::WorkerClosed)?;
        rx.await
            .map_err(|_| Error::WorkerClosed)?
            .map_err(Error::Store)
    }
}

/// The worker loop; see [`RecomputeWorker::spawn`].
pub struct RecomputeWorker<S: MemberStore> {
    orchestrator: Arc<Orchestrator<S>>,
    rx: mpsc::UnboundedReceiver<Request>,
    debounce: Duration,
    schedule: Option<Interval>,
    /// Set when the last run skipped stale writes; served before anything queued
    rerun: bool,
}

impl<S: MemberStore> RecomputeWorker<S> {
    /// Start the worker on the current runtime.
    pub fn spawn(store: Arc<S>, config: &EngineConfig) -> (RecomputeHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let schedule = config.recompute_interval.map(|period| {
            let mut interval =
                tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval
        });
        let worker = Self {
            orchestrator: Arc::new(Orchestrator::new(store, config)),
            rx,
            debounce: config.debounce,
            schedule,
            rerun: false,
        };
        let task = tokio::spawn(worker.run());
        (RecomputeHandle { tx }, task)
    }

    async fn next_request(&mut self) -> Option<Request> {
        if std::mem::take(&mut self.rerun) {
            return Some(Request {
                trigger: RecomputeTrigger::Stale,
                reply: None,
            });
        }
        match self.schedule.as_mut() {
            Some(schedule) => tokio::select! {
                request = self.rx.recv() => request,
                _ = schedule.tick() => Some(Request {
                    trigger: RecomputeTrigger::Schedule,
                    reply: None,
                }),
            },
            None => self.rx.recv().await,
        }
    }

    async fn run(mut self) {
        info!("Recompute worker started");
        while let Some(first) = self.next_request().await {
            let settle = first.trigger == RecomputeTrigger::Change && !self.debounce.is_zero();
            if settle {
                tokio::time::sleep(self.debounce).await;
            }

            let mut pending = vec![first];
            while let Ok(request) = self.rx.try_recv() {
                pending.push(request);
            }
            debug!(
                "Serving {} queued recompute request(s), first {:?}",
                pending.len(),
                pending[0].trigger
            );

            let orchestrator = Arc::clone(&self.orchestrator);
            let result = match tokio::task::spawn_blocking(move || orchestrator.run_full_recompute())
                .await
            {
                Ok(Ok(stats)) => Ok(stats),
                Ok(Err(e)) => Err(e.to_string()),
                Err(e) => Err(format!("recompute task failed: {}", e)),
            };
            match &result {
                Ok(stats) if stats.stale_skipped > 0 => {
                    debug!(
                        "Run {} skipped {} stale write(s); running again",
                        stats.run, stats.stale_skipped
                    );
                    self.rerun = true;
                }
                Ok(_) => {}
                Err(e) => error!("Recompute failed: {}", e),
            }

            for request in pending {
                if let Some(reply) = request.reply {
                    let _ = reply.send(result.clone());
                }
            }
        }
        info!("Recompute worker stopped");
    }
}
