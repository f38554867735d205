//! Running engine: recompute worker, change watcher and report schedule.

use crate::config::EngineConfig;
use crate::error::Result;
use crate::orchestrator::RecomputeStats;
use crate::report::{periodic_report, ReportSnapshot};
use crate::resolver::AmbiguityPolicy;
use crate::store::MemberStore;
use crate::watcher::spawn_watcher;
use crate::worker::{RecomputeHandle, RecomputeWorker};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

/// The engine wired to one store.
pub struct EngineService<S: MemberStore> {
    store: Arc<S>,
    recompute: RecomputeHandle,
    ambiguity: AmbiguityPolicy,
    tasks: Vec<JoinHandle<()>>,
}

impl<S: MemberStore> EngineService<S> {
    /// Spawn the worker, the watcher and (if configured) the report schedule.
    pub fn start(store: Arc<S>, config: &EngineConfig) -> Self {
        let (recompute, worker) = RecomputeWorker::spawn(Arc::clone(&store), config);
        let watcher = spawn_watcher(Arc::clone(&store), recompute.clone());
        let mut tasks = vec![worker, watcher];

        if let Some(period) = config.report_interval {
            let store = Arc::clone(&store);
            let policy = config.ambiguity;
            tasks.push(tokio::spawn(async move {
                let mut interval =
                    tokio::time::interval_at(tokio::time::Instant::now() + period, period);
                interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    interval.tick().await;
                    let store = Arc::clone(&store);
                    match tokio::task::spawn_blocking(move || periodic_report(store.as_ref(), policy))
                        .await
                    {
                        Ok(Ok(_)) => {}
                        Ok(Err(e)) => error!("Scheduled report failed: {}", e),
                        Err(e) => error!("Scheduled report task failed: {}", e),
                    }
                }
            }));
        }

        info!(
            "Engine started (ambiguity {:?}, batch limit {})",
            config.ambiguity, config.batch_limit
        );
        Self {
            store,
            recompute,
            ambiguity: config.ambiguity,
            tasks,
        }
    }

    /// The store the engine runs against.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Handle for queueing recomputes.
    pub fn recompute_handle(&self) -> RecomputeHandle {
        self.recompute.clone()
    }

    /// Administrative full recompute; waits for the result.
    pub async fn trigger_full_recompute(&self) -> Result<RecomputeStats> {
        self.recompute.recompute_now().await
    }

    /// Take a report now and append it to the analytics record.
    pub fn report(&self) -> Result<ReportSnapshot> {
        periodic_report(self.store.as_ref(), self.ambiguity)
    }

    /// Stop all background tasks.
    pub fn shutdown(self) {
        for task in self.tasks {
            task.abort();
        }
        info!("Engine stopped");
    }
}
