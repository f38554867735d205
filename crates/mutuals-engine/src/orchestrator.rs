//! Full recompute: snapshot, ratchet, calculate, commit in bounded batches.
//!
//! All reads happen before any computation, and all computation before any
//! write. Batches are atomic one by one but not as a whole; a run that dies
//! halfway leaves some members updated and some not. The plan is a pure
//! function of the snapshot, so running again converges.

use crate::calculator::{MatchCalculator, RecomputeTotals};
use crate::config::EngineConfig;
use crate::error::Result;
use crate::model::{now_millis, EngineWrite, Member};
use crate::ratchet::{missing_locks, restore_locks};
use crate::store::MemberStore;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Writes derived from one snapshot.
#[derive(Debug, Clone, Default)]
pub struct RecomputePlan {
    /// One write per member whose engine-owned fields changed
    pub writes: Vec<EngineWrite>,
    /// Members already up to date
    pub unchanged: usize,
    /// Locked crushes put back into crush lists before calculating
    pub restored_locks: usize,
    /// Calculator aggregates
    pub totals: RecomputeTotals,
}

/// Plan a recompute over `snapshot`.
///
/// Members are ordered by id first, so the plan does not depend on the order
/// the store returned them in.
pub fn plan_recompute(
    mut snapshot: Vec<Member>,
    calculator: &MatchCalculator,
    now: u64,
) -> RecomputePlan {
    snapshot.sort_by(|a, b| a.id.cmp(&b.id));

    let mut restored: Vec<Option<Vec<String>>> = Vec::with_capacity(snapshot.len());
    let mut restored_locks = 0;
    for member in snapshot.iter_mut() {
        let missing = missing_locks(&member.locked_crushes, &member.crushes).len();
        let corrected = restore_locks(&member.locked_crushes, &member.crushes);
        if let Some(ref crushes) = corrected {
            restored_locks += missing;
            warn!(
                "Member {} is missing {} locked crush(es); restoring",
                member.id, missing
            );
            member.crushes = crushes.clone();
        }
        restored.push(corrected);
    }

    let result = calculator.recompute(&snapshot, now);

    let mut plan = RecomputePlan {
        restored_locks,
        totals: result.totals.clone(),
        ..Default::default()
    };

    for (member, crushes) in snapshot.iter().zip(restored) {
        let Some(outcome) = result.outcome(&member.id) else {
            continue;
        };
        let changed = crushes.is_some()
            || outcome.crush_count != member.crush_count
            || outcome.matches != member.matches
            || outcome.locked_crushes != member.locked_crushes;
        if !changed {
            plan.unchanged += 1;
            continue;
        }
        plan.writes.push(EngineWrite {
            id: member.id.clone(),
            expected_revision: member.revision,
            crushes,
            locked_crushes: outcome.locked_crushes.clone(),
            matches: outcome.matches.clone(),
            crush_count: outcome.crush_count,
        });
    }

    plan
}

/// Summary of one full recompute run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecomputeStats {
    /// Sequence number of the run within this process
    pub run: u64,
    pub totals: RecomputeTotals,
    pub restored_locks: usize,
    /// Member writes applied
    pub writes: usize,
    pub unchanged: usize,
    pub batches: usize,
    /// Writes discarded because the member changed after the snapshot
    pub stale_skipped: usize,
    pub duration_ms: u64,
}

/// Owns the read-compute-write cycle against a store.
pub struct Orchestrator<S: MemberStore> {
    store: Arc<S>,
    calculator: MatchCalculator,
    batch_limit: usize,
    runs: AtomicU64,
}

impl<S: MemberStore> Orchestrator<S> {
    /// Create an orchestrator; the batch limit is capped by the store's bound.
    pub fn new(store: Arc<S>, config: &EngineConfig) -> Self {
        let batch_limit = config.batch_limit.min(store.max_batch_size()).max(1);
        Self {
            store,
            calculator: MatchCalculator::new(config.ambiguity),
            batch_limit,
            runs: AtomicU64::new(0),
        }
    }

    /// The store this orchestrator writes to.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Effective batch limit.
    pub fn batch_limit(&self) -> usize {
        self.batch_limit
    }

    /// Run a full recompute stamped with the current time.
    pub fn run_full_recompute(&self) -> Result<RecomputeStats> {
        self.run_at(now_millis())
    }

    /// Run a full recompute, stamping new matches with `now`.
    pub fn run_at(&self, now: u64) -> Result<RecomputeStats> {
        let started = Instant::now();
        let run = self.runs.fetch_add(1, Ordering::Relaxed) + 1;

        let snapshot = self.store.snapshot()?;
        let plan = plan_recompute(snapshot, &self.calculator, now);

        let mut stats = RecomputeStats {
            run,
            totals: plan.totals,
            restored_locks: plan.restored_locks,
            unchanged: plan.unchanged,
            ..Default::default()
        };

        for (index, chunk) in plan.writes.chunks(self.batch_limit).enumerate() {
            let outcome = self.store.commit_batch(chunk).map_err(|e| {
                warn!(
                    "Recompute #{} failed at batch {} ({} of {} writes committed): {}",
                    run,
                    index,
                    stats.writes,
                    plan.writes.len(),
                    e
                );
                e
            })?;
            debug!(
                "Recompute #{} batch {}: {} applied, {} stale",
                run,
                index,
                outcome.applied,
                outcome.stale.len()
            );
            if !outcome.stale.is_empty() {
                warn!(
                    "Recompute #{} discarded stale writes for {:?}",
                    run, outcome.stale
                );
            }
            stats.writes += outcome.applied;
            stats.stale_skipped += outcome.stale.len();
            stats.batches += 1;
        }

        stats.duration_ms = started.elapsed().as_millis() as u64;
        info!(
            "Recompute #{}: {} members, {} match pairs, {} writes in {} batches, {} stale, {}ms",
            run,
            stats.totals.members,
            stats.totals.match_pairs,
            stats.writes,
            stats.batches,
            stats.stale_skipped,
            stats.duration_ms
        );
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::model::MemberEdit;
    use crate::report::ReportSnapshot;
    use crate::store::{BatchOutcome, MemoryStore};
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::broadcast;

    fn member(id: &str, name: &str, crushes: &[&str]) -> Member {
        Member::new(id.into(), format!("{}@example.org", id))
            .with_name(name)
            .with_crushes(crushes.iter().copied())
    }

    fn orchestrator(members: Vec<Member>, limit: usize) -> Orchestrator<MemoryStore> {
        let store = Arc::new(MemoryStore::with_members(members));
        Orchestrator::new(store, &EngineConfig::immediate().with_batch_limit(limit))
    }

    #[test]
    fn mutual_pair_is_written_back() {
        let orch = orchestrator(vec![member("a", "A", &["B"]), member("b", "B", &["A"])], 500);
        let stats = orch.run_at(10).unwrap();
        assert_eq!(stats.writes, 2);
        assert_eq!(stats.batches, 1);
        assert_eq!(stats.totals.match_pairs, 1);

        let a = orch.store().get("a").unwrap().unwrap();
        assert_eq!(a.matches[0].peer_name, "B");
        assert_eq!(a.locked_crushes, vec!["B".to_string()]);
        assert_eq!(a.crush_count, 1);
    }

    #[test]
    fn second_run_writes_nothing() {
        let orch = orchestrator(
            vec![
                member("a", "A", &["B", "Jon Smith"]),
                member("b", "B", &["A"]),
                member("c", "C", &["A"]),
            ],
            500,
        );
        orch.run_at(10).unwrap();
        let after_first = orch.store().snapshot().unwrap();

        let stats = orch.run_at(20).unwrap();
        assert_eq!(stats.writes, 0);
        assert_eq!(stats.batches, 0);
        assert_eq!(stats.unchanged, 3);
        assert_eq!(orch.store().snapshot().unwrap(), after_first);
    }

    #[test]
    fn writes_are_chunked_by_batch_limit() {
        let members: Vec<Member> = (0..7)
            .map(|i| {
                let crush = format!("Person {}", (i + 1) % 7);
                member(&format!("m{}", i), &format!("Person {}", i), &[crush.as_str()])
            })
            .collect();
        let orch = orchestrator(members, 3);
        let stats = orch.run_at(1).unwrap();
        assert_eq!(stats.writes, 7);
        assert_eq!(stats.batches, 3);
    }

    #[test]
    fn store_bound_caps_configured_limit() {
        let store = Arc::new(MemoryStore::with_max_batch(2));
        let orch = Orchestrator::new(store, &EngineConfig::immediate().with_batch_limit(100));
        assert_eq!(orch.batch_limit(), 2);
    }

    #[test]
    fn dropped_lock_is_restored_in_memory() {
        let mut a = member("a", "A", &[]);
        a.locked_crushes.push("B".into());
        let orch = orchestrator(vec![a, member("b", "B", &["A"])], 500);

        let stats = orch.run_at(1).unwrap();
        assert_eq!(stats.restored_locks, 1);
        let a = orch.store().get("a").unwrap().unwrap();
        assert_eq!(a.crushes, vec!["B".to_string()]);
        assert_eq!(a.matches.len(), 1);
    }

    /// Delegates to a memory store but fails every commit after the first `ok` ones.
    struct FlakyStore {
        inner: MemoryStore,
        ok: usize,
        commits: AtomicUsize,
    }

    impl MemberStore for FlakyStore {
        fn snapshot(&self) -> Result<Vec<Member>> {
            self.inner.snapshot()
        }
        fn get(&self, id: &str) -> Result<Option<Member>> {
            self.inner.get(id)
        }
        fn insert(&self, member: Member) -> Result<()> {
            self.inner.insert(member)
        }
        fn apply_edit(&self, id: &str, edit: MemberEdit) -> Result<Member> {
            self.inner.apply_edit(id, edit)
        }
        fn commit_batch(&self, batch: &[EngineWrite]) -> Result<BatchOutcome> {
            if self.commits.fetch_add(1, Ordering::SeqCst) >= self.ok {
                return Err(Error::Store("disk on fire".into()));
            }
            self.inner.commit_batch(batch)
        }
        fn append_report(&self, report: &ReportSnapshot) -> Result<()> {
            self.inner.append_report(report)
        }
        fn latest_report(&self) -> Result<Option<ReportSnapshot>> {
            self.inner.latest_report()
        }
        fn watch(&self) -> broadcast::Receiver<crate::model::MemberChange> {
            self.inner.watch()
        }
    }

    #[test]
    fn partial_failure_heals_on_rerun() {
        let members = vec![
            member("a", "A", &["B"]),
            member("b", "B", &["A"]),
            member("c", "C", &["D"]),
            member("d", "D", &["C"]),
        ];
        let flaky = Arc::new(FlakyStore {
            inner: MemoryStore::with_members(members.clone()),
            ok: 1,
            commits: AtomicUsize::new(0),
        });
        let config = EngineConfig::immediate().with_batch_limit(2);
        let orch = Orchestrator::new(Arc::clone(&flaky), &config);
        assert!(orch.run_at(5).is_err());

        // Half-applied: a and b updated, c and d not
        let c = flaky.get("c").unwrap().unwrap();
        assert!(c.matches.is_empty());
        assert_eq!(flaky.get("a").unwrap().unwrap().matches.len(), 1);

        // Re-run against a healthy store with the same data converges
        let healthy = Arc::new(MemoryStore::with_members(flaky.snapshot().unwrap()));
        let orch = Orchestrator::new(Arc::clone(&healthy), &config);
        orch.run_at(5).unwrap();

        let reference = orchestrator(members, 500);
        reference.run_at(5).unwrap();
        assert_eq!(healthy.snapshot().unwrap(), reference.store().snapshot().unwrap());
    }

    #[test]
    fn plan_ignores_snapshot_order() {
        let members = vec![
            member("a", "Jon Q Smith", &["Bea"]),
            member("b", "Jon R Smith", &["Bea"]),
            member("c", "Bea", &["Jon Smith"]),
        ];
        let mut reversed = members.clone();
        reversed.reverse();

        let calc = MatchCalculator::default();
        let forward = plan_recompute(members, &calc, 1).writes;
        let backward = plan_recompute(reversed, &calc, 1).writes;
        assert_eq!(forward, backward);
    }
}
