//! Persistent member storage using RocksDB.
//!
//! Key layout:
//!
//! - `member:{id}` → member JSON
//! - `report:{seq:020}` → report JSON, append-only
//! - `meta:report_seq` → last report sequence number

use crate::error::{Error, Result};
use mutuals_engine::{
    BatchOutcome, EngineWrite, Member, MemberChange, MemberEdit, MemberStore, ReportSnapshot,
    DEFAULT_MAX_BATCH,
};
use rocksdb::{Options, WriteBatch, DB};
use std::path::Path;
use std::sync::Mutex;
use tokio::sync::broadcast;

const REPORT_SEQ_KEY: &[u8] = b"meta:report_seq";

/// RocksDB-backed member store.
pub struct Storage {
    db: DB,
    /// Serializes read-check-write sequences
    write_lock: Mutex<()>,
    changes: broadcast::Sender<MemberChange>,
    max_batch: usize,
}

impl Storage {
    /// Open or create storage at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with_batch_limit(path, DEFAULT_MAX_BATCH)
    }

    /// Open storage with a custom atomic batch bound.
    pub fn open_with_batch_limit<P: AsRef<Path>>(path: P, max_batch: usize) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        let db = DB::open(&opts, path)?;
        let (changes, _) = broadcast::channel(mutuals_engine::store::CHANGE_FEED_CAPACITY);
        Ok(Self {
            db,
            write_lock: Mutex::new(()),
            changes,
            max_batch: max_batch.max(1),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, ()>> {
        self.write_lock
            .lock()
            .map_err(|_| Error::Storage("write lock poisoned".into()))
    }

    fn member_key(id: &str) -> String {
        format!("member:{}", id)
    }

    // --- Members ---

    /// Store a member, replacing any existing record. Does not publish a change.
    pub fn put_member(&self, member: &Member) -> Result<()> {
        let value = serde_json::to_vec(member)?;
        self.db.put(Self::member_key(&member.id).as_bytes(), value)?;
        Ok(())
    }

    /// Get a member by ID.
    pub fn get_member(&self, id: &str) -> Result<Option<Member>> {
        match self.db.get(Self::member_key(id).as_bytes())? {
            Some(data) => Ok(Some(serde_json::from_slice(&data)?)),
            None => Ok(None),
        }
    }

    /// List all members, ordered by id.
    pub fn list_members(&self) -> Result<Vec<Member>> {
        let prefix = b"member:";
        let mut members = Vec::new();

        let iter = self.db.prefix_iterator(prefix);
        for item in iter {
            let (key, value) = item?;
            if key.starts_with(prefix) {
                let member: Member = serde_json::from_slice(&value)?;
                members.push(member);
            } else {
                break;
            }
        }

        Ok(members)
    }

    // --- Reports ---

    fn report_seq(&self) -> Result<u64> {
        match self.db.get(REPORT_SEQ_KEY)? {
            Some(data) => {
                let bytes: [u8; 8] = data
                    .as_slice()
                    .try_into()
                    .map_err(|_| Error::Storage("Invalid report sequence".into()))?;
                Ok(u64::from_be_bytes(bytes))
            }
            None => Ok(0),
        }
    }

    /// Append a report under the next sequence number.
    pub fn put_report(&self, report: &ReportSnapshot) -> Result<u64> {
        let _guard = self.lock()?;
        let seq = self.report_seq()? + 1;
        let mut batch = WriteBatch::default();
        batch.put(format!("report:{:020}", seq).as_bytes(), serde_json::to_vec(report)?);
        batch.put(REPORT_SEQ_KEY, seq.to_be_bytes());
        self.db.write(batch)?;
        Ok(seq)
    }

    /// Get a report by sequence number.
    pub fn get_report(&self, seq: u64) -> Result<Option<ReportSnapshot>> {
        match self.db.get(format!("report:{:020}", seq).as_bytes())? {
            Some(data) => Ok(Some(serde_json::from_slice(&data)?)),
            None => Ok(None),
        }
    }

    fn publish(&self, before: Option<Member>, after: Member) {
        let _ = self.changes.send(MemberChange { before, after });
    }
}

impl MemberStore for Storage {
    fn snapshot(&self) -> mutuals_engine::Result<Vec<Member>> {
        Ok(self.list_members()?)
    }

    fn get(&self, id: &str) -> mutuals_engine::Result<Option<Member>> {
        Ok(self.get_member(id)?)
    }

    fn insert(&self, member: Member) -> mutuals_engine::Result<()> {
        {
            let _guard = self.lock()?;
            if self.get_member(&member.id)?.is_some() {
                return Err(Error::InvalidInput(format!("member {} already exists", member.id)).into());
            }
            self.put_member(&member)?;
        }
        self.publish(None, member);
        Ok(())
    }

    fn apply_edit(&self, id: &str, edit: MemberEdit) -> mutuals_engine::Result<Member> {
        let (before, after) = {
            let _guard = self.lock()?;
            let before = self
                .get_member(id)?
                .ok_or_else(|| Error::NotFound(id.to_string()))?;
            let mut after = before.clone();
            after.apply(edit);
            self.put_member(&after)?;
            (before, after)
        };
        self.publish(Some(before), after.clone());
        Ok(after)
    }

    fn commit_batch(&self, writes: &[EngineWrite]) -> mutuals_engine::Result<BatchOutcome> {
        if writes.len() > self.max_batch {
            return Err(Error::InvalidInput(format!(
                "batch of {} exceeds limit {}",
                writes.len(),
                self.max_batch
            ))
            .into());
        }

        let mut outcome = BatchOutcome::default();
        let mut changes = Vec::new();
        {
            let _guard = self.lock()?;
            let mut batch = WriteBatch::default();
            for write in writes {
                match self.get_member(&write.id)? {
                    Some(before) if before.revision == write.expected_revision => {
                        let mut after = before.clone();
                        after.apply_engine_write(write);
                        batch.put(
                            Self::member_key(&after.id).as_bytes(),
                            serde_json::to_vec(&after).map_err(Error::from)?,
                        );
                        changes.push((before, after));
                    }
                    _ => outcome.stale.push(write.id.clone()),
                }
            }
            self.db.write(batch).map_err(Error::from)?;
        }
        outcome.applied = changes.len();
        for (before, after) in changes {
            self.publish(Some(before), after);
        }
        Ok(outcome)
    }

    fn append_report(&self, report: &ReportSnapshot) -> mutuals_engine::Result<()> {
        self.put_report(report)?;
        Ok(())
    }

    fn latest_report(&self) -> mutuals_engine::Result<Option<ReportSnapshot>> {
        match self.report_seq()? {
            0 => Ok(None),
            seq => Ok(self.get_report(seq)?),
        }
    }

    fn watch(&self) -> broadcast::Receiver<MemberChange> {
        self.changes.subscribe()
    }

    fn max_batch_size(&self) -> usize {
        self.max_batch
    }
}
