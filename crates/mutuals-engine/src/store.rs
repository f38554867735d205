//! Member repository interface and an in-memory implementation.
//!
//! The engine never reaches for a global client: a [`MemberStore`] is built
//! by the caller and handed in. Every write is published on the store's change
//! feed, including the engine's own batch commits.

use crate::error::{Error, Result};
use crate::model::{EngineWrite, Member, MemberChange, MemberEdit, MemberId};
use crate::report::ReportSnapshot;
use std::collections::BTreeMap;
use std::sync::RwLock;
use tokio::sync::broadcast;

/// Largest number of documents one atomic batch may touch.
pub const DEFAULT_MAX_BATCH: usize = 500;

/// Capacity of the change feed before slow subscribers lag.
pub const CHANGE_FEED_CAPACITY: usize = 1024;

/// What happened to one committed batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    /// Writes applied
    pub applied: usize,
    /// Writes discarded because the member changed (or vanished) since the snapshot
    pub stale: Vec<MemberId>,
}

/// Repository of member records.
pub trait MemberStore: Send + Sync + 'static {
    /// Read every member.
    fn snapshot(&self) -> Result<Vec<Member>>;

    /// Read one member.
    fn get(&self, id: &str) -> Result<Option<Member>>;

    /// Create a member (signup). Fails if the id is taken.
    fn insert(&self, member: Member) -> Result<()>;

    /// Apply a client write and return the updated record.
    fn apply_edit(&self, id: &str, edit: MemberEdit) -> Result<Member>;

    /// Atomically apply engine writes whose expected revision still matches.
    fn commit_batch(&self, batch: &[EngineWrite]) -> Result<BatchOutcome>;

    /// Append a report to the analytics record.
    fn append_report(&self, report: &ReportSnapshot) -> Result<()>;

    /// Most recently appended report.
    fn latest_report(&self) -> Result<Option<ReportSnapshot>>;

    /// Subscribe to member changes.
    fn watch(&self) -> broadcast::Receiver<MemberChange>;

    /// Atomic batch bound.
    fn max_batch_size(&self) -> usize {
        DEFAULT_MAX_BATCH
    }
}

/// In-process store, used by tests and embedders without persistence.
pub struct MemoryStore {
    members: RwLock<BTreeMap<MemberId, Member>>,
    reports: RwLock<Vec<ReportSnapshot>>,
    changes: broadcast::Sender<MemberChange>,
    max_batch: usize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::with_max_batch(DEFAULT_MAX_BATCH)
    }

    /// Create an empty store with a custom atomic batch bound.
    pub fn with_max_batch(max_batch: usize) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_FEED_CAPACITY);
        Self {
            members: RwLock::new(BTreeMap::new()),
            reports: RwLock::new(Vec::new()),
            changes,
            max_batch: max_batch.max(1),
        }
    }

    /// Seed the store with members, bypassing the change feed.
    pub fn with_members(members: impl IntoIterator<Item = Member>) -> Self {
        let seeded: BTreeMap<MemberId, Member> = members
            .into_iter()
            .map(|member| (member.id.clone(), member))
            .collect();
        Self {
            members: RwLock::new(seeded),
            ..Self::new()
        }
    }

    fn publish(&self, before: Option<Member>, after: Member) {
        // No subscribers is fine
        let _ = self.changes.send(MemberChange { before, after });
    }
}

fn poisoned<T>(_: T) -> Error {
    Error::Store("store lock poisoned".into())
}

impl MemberStore for MemoryStore {
    fn snapshot(&self) -> Result<Vec<Member>> {
        let map = self.members.read().map_err(poisoned)?;
        Ok(map.values().cloned().collect())
    }

    fn get(&self, id: &str) -> Result<Option<Member>> {
        let map = self.members.read().map_err(poisoned)?;
        Ok(map.get(id).cloned())
    }

    fn insert(&self, member: Member) -> Result<()> {
        {
            let mut map = self.members.write().map_err(poisoned)?;
            if map.contains_key(&member.id) {
                return Err(Error::InvalidInput(format!("member {} already exists", member.id)));
            }
            map.insert(member.id.clone(), member.clone());
        }
        self.publish(None, member);
        Ok(())
    }

    fn apply_edit(&self, id: &str, edit: MemberEdit) -> Result<Member> {
        let (before, after) = {
            let mut map = self.members.write().map_err(poisoned)?;
            let member = map
                .get_mut(id)
                .ok_or_else(|| Error::NotFound(id.to_string()))?;
            let before = member.clone();
            member.apply(edit);
            (before, member.clone())
        };
        self.publish(Some(before), after.clone());
        Ok(after)
    }

    fn commit_batch(&self, batch: &[EngineWrite]) -> Result<BatchOutcome> {
        if batch.len() > self.max_batch {
            return Err(Error::InvalidInput(format!(
                "batch of {} exceeds limit {}",
                batch.len(),
                self.max_batch
            )));
        }

        let mut outcome = BatchOutcome::default();
        let mut changes = Vec::new();
        {
            let mut map = self.members.write().map_err(poisoned)?;
            for write in batch {
                match map.get_mut(&write.id) {
                    Some(member) if member.revision == write.expected_revision => {
                        let before = member.clone();
                        member.apply_engine_write(write);
                        changes.push((before, member.clone()));
                        outcome.applied += 1;
                    }
                    _ => outcome.stale.push(write.id.clone()),
                }
            }
        }
        for (before, after) in changes {
            self.publish(Some(before), after);
        }
        Ok(outcome)
    }

    fn append_report(&self, report: &ReportSnapshot) -> Result<()> {
        self.reports.write().map_err(poisoned)?.push(report.clone());
        Ok(())
    }

    fn latest_report(&self) -> Result<Option<ReportSnapshot>> {
        Ok(self.reports.read().map_err(poisoned)?.last().cloned())
    }

    fn watch(&self) -> broadcast::Receiver<MemberChange> {
        self.changes.subscribe()
    }

    fn max_batch_size(&self) -> usize {
        self.max_batch
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_for(member: &Member, count: u32) -> EngineWrite {
        EngineWrite {
            id: member.id.clone(),
            expected_revision: member.revision,
            crushes: None,
            locked_crushes: Vec::new(),
            matches: Vec::new(),
            crush_count: count,
        }
    }

    #[test]
    fn seeded_members_are_present_and_unpublished() {
        let store = MemoryStore::with_members([
            Member::new("b".into(), String::new()),
            Member::new("a".into(), String::new()),
        ]);
        let mut feed = store.watch();
        let ids: Vec<MemberId> = store.snapshot().unwrap().into_iter().map(|m| m.id).collect();
        assert_eq!(ids, vec!["a".to_string(), "b".to_string()]);
        assert!(feed.try_recv().is_err());
        assert_eq!(store.max_batch_size(), DEFAULT_MAX_BATCH);
    }

    #[test]
    fn insert_rejects_duplicate_ids() {
        let store = MemoryStore::new();
        store.insert(Member::new("a".into(), String::new())).unwrap();
        assert!(matches!(
            store.insert(Member::new("a".into(), String::new())),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn edit_unknown_member() {
        let store = MemoryStore::new();
        let result = store.apply_edit("ghost", MemberEdit::SetContact("x".into()));
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[test]
    fn stale_writes_are_discarded() {
        let store = MemoryStore::new();
        store.insert(Member::new("a".into(), String::new())).unwrap();
        store.insert(Member::new("b".into(), String::new())).unwrap();
        let snapshot = store.snapshot().unwrap();

        // A client write lands between snapshot and commit
        store
            .apply_edit("a", MemberEdit::SetCrushes(vec!["Bob".into()]))
            .unwrap();

        let batch: Vec<_> = snapshot.iter().map(|m| write_for(m, 4)).collect();
        let outcome = store.commit_batch(&batch).unwrap();
        assert_eq!(outcome.applied, 1);
        assert_eq!(outcome.stale, vec!["a".to_string()]);
        assert_eq!(store.get("a").unwrap().unwrap().crush_count, 0);
        assert_eq!(store.get("b").unwrap().unwrap().crush_count, 4);
    }

    #[test]
    fn oversized_batch_is_refused() {
        let store = MemoryStore::with_max_batch(1);
        let a = Member::new("a".into(), String::new());
        let b = Member::new("b".into(), String::new());
        let result = store.commit_batch(&[write_for(&a, 1), write_for(&b, 1)]);
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[test]
    fn every_write_is_published() {
        let store = MemoryStore::new();
        let mut rx = store.watch();
        store.insert(Member::new("a".into(), String::new())).unwrap();
        store
            .apply_edit("a", MemberEdit::SetIdentityName("Ada".into()))
            .unwrap();

        let signup = rx.try_recv().unwrap();
        assert!(signup.before.is_none());
        let edit = rx.try_recv().unwrap();
        assert_eq!(edit.before.unwrap().identity_name, "");
        assert_eq!(edit.after.identity_name, "Ada");
    }
}
