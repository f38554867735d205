//! Reacting to member changes.
//!
//! Every change on the store's feed goes through the same gate:
//!
//! 1. [`is_material_change`]: engine writes and no-op client writes stop here
//! 2. [`enforce_locks`]: a client write that dropped a locked crush is
//!    corrected in place and does not recompute in this step; the corrective
//!    write comes back through the feed as a material change of its own
//! 3. otherwise a recompute is queued on the worker

use crate::error::Result;
use crate::model::{MemberChange, MemberEdit};
use crate::ratchet::enforce_locks;
use crate::store::MemberStore;
use crate::trigger::is_material_change;
use crate::worker::{RecomputeHandle, RecomputeTrigger};
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// What was done about one change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeDisposition {
    /// Not material
    Ignored,
    /// Locked crushes were written back instead of recomputing
    Corrected { restored: Vec<String> },
    /// A recompute was queued
    Scheduled,
}

/// Handle one change event.
pub fn on_member_changed<S: MemberStore + ?Sized>(
    store: &S,
    recompute: &RecomputeHandle,
    change: &MemberChange,
) -> Result<ChangeDisposition> {
    let after = &change.after;
    if !is_material_change(change.before.as_ref(), after) {
        debug!("Change to {} is not material", after.id);
        return Ok(ChangeDisposition::Ignored);
    }

    if let Some(before) = &change.before {
        if let Some(corrected) = enforce_locks(before, after) {
            let restored: Vec<String> = corrected
                .iter()
                .filter(|c| !after.crushes.contains(c))
                .cloned()
                .collect();
            warn!(
                "Member {} dropped locked crush(es) {:?}; restoring",
                after.id, restored
            );
            store.apply_edit(&after.id, MemberEdit::SetCrushes(corrected))?;
            return Ok(ChangeDisposition::Corrected { restored });
        }
    }

    debug!("Change to {} is material; scheduling recompute", after.id);
    recompute.schedule(RecomputeTrigger::Change)?;
    Ok(ChangeDisposition::Scheduled)
}

/// Consume a change feed until it closes.
pub async fn watch_changes<S: MemberStore>(
    store: Arc<S>,
    recompute: RecomputeHandle,
    mut changes: broadcast::Receiver<MemberChange>,
) {
    info!("Change watcher started");
    loop {
        match changes.recv().await {
            Ok(change) => {
                if let Err(e) = on_member_changed(store.as_ref(), &recompute, &change) {
                    error!("Failed to handle change to {}: {}", change.after.id, e);
                }
            }
            Err(RecvError::Lagged(missed)) => {
                warn!("Change watcher lagged by {} event(s); scheduling full recompute", missed);
                if recompute.schedule(RecomputeTrigger::Lagged).is_err() {
                    break;
                }
            }
            Err(RecvError::Closed) => break,
        }
    }
    info!("Change watcher stopped");
}

/// Subscribe to `store` now and spawn [`watch_changes`].
pub fn spawn_watcher<S: MemberStore>(store: Arc<S>, recompute: RecomputeHandle) -> JoinHandle<()> {
    let changes = store.watch();
    tokio::spawn(watch_changes(store, recompute, changes))
}
