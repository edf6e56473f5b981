//! Snapshot Record ledger.
//!
//! The orchestrator is the only writer. Diff and restore resolve tags
//! through it; `list` reads it.

use crate::errors::{ExError, ExErrorKind, ExResult};
use crate::model::{BackendStatus, SnapshotRecord};
use crate::tag::VersionTag;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

pub trait SnapshotLedger: Send + Sync {
    /// Store a new record. Fails if the tag is already present.
    fn insert(&self, record: &SnapshotRecord) -> ExResult<()>;

    fn update_status(&self, tag: &VersionTag, status: BackendStatus) -> ExResult<()>;

    /// Drop the record of a snapshot that was taken down again. Removing an
    /// absent tag is not an error.
    fn remove(&self, tag: &VersionTag) -> ExResult<()>;

    fn get(&self, tag: &VersionTag) -> ExResult<Option<SnapshotRecord>>;

    fn exists(&self, tag: &VersionTag) -> ExResult<bool> {
        Ok(self.get(tag)?.is_some())
    }

    /// Records, optionally of one category, newest first
    fn list(&self, category: Option<&str>) -> ExResult<Vec<SnapshotRecord>>;
}

/// Presentation order for listings: newest `created_at` first, tag string
/// as tie-breaker.
pub fn sort_newest_first(records: &mut [SnapshotRecord]) {
    records.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| b.tag.to_string().cmp(&a.tag.to_string()))
    });
}

#[derive(Debug, Default)]
pub struct MemoryLedger {
    records: Mutex<BTreeMap<String, SnapshotRecord>>,
    fail_inserts: AtomicBool,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every later `insert` fail with a persistence error
    pub fn fail_inserts(&self, fail: bool) {
        self.fail_inserts.store(fail, Ordering::SeqCst);
    }

    fn poisoned() -> ExError {
        ExError::new(ExErrorKind::Internal).with_message("ledger lock poisoned")
    }
}

impl SnapshotLedger for MemoryLedger {
    fn insert(&self, record: &SnapshotRecord) -> ExResult<()> {
        if self.fail_inserts.load(Ordering::SeqCst) {
            return Err(ExError::new(ExErrorKind::Persistence)
                .with_op("ledger_insert")
                .with_tag(record.tag.to_string())
                .with_message("injected ledger failure"));
        }
        let mut records = self.records.lock().map_err(|_| Self::poisoned())?;
        let key = record.tag.to_string();
        if records.contains_key(&key) {
            return Err(ExError::new(ExErrorKind::Persistence)
                .with_op("ledger_insert")
                .with_tag(key)
                .with_message("snapshot record already exists"));
        }
        records.insert(key, record.clone());
        Ok(())
    }

    fn update_status(&self, tag: &VersionTag, status: BackendStatus) -> ExResult<()> {
        let mut records = self.records.lock().map_err(|_| Self::poisoned())?;
        match records.get_mut(&tag.to_string()) {
            Some(record) => {
                record.backend_status = status;
                Ok(())
            }
            None => Err(ExError::new(ExErrorKind::UnknownVersion)
                .with_op("ledger_update_status")
                .with_tag(tag.to_string())),
        }
    }

    fn remove(&self, tag: &VersionTag) -> ExResult<()> {
        let mut records = self.records.lock().map_err(|_| Self::poisoned())?;
        records.remove(&tag.to_string());
        Ok(())
    }

    fn get(&self, tag: &VersionTag) -> ExResult<Option<SnapshotRecord>> {
        let records = self.records.lock().map_err(|_| Self::poisoned())?;
        Ok(records.get(&tag.to_string()).cloned())
    }

    fn list(&self, category: Option<&str>) -> ExResult<Vec<SnapshotRecord>> {
        let records = self.records.lock().map_err(|_| Self::poisoned())?;
        let mut out: Vec<SnapshotRecord> = records
            .values()
            .filter(|r| category.map_or(true, |c| r.tag.category() == c))
            .cloned()
            .collect();
        sort_newest_first(&mut out);
        Ok(out)
    }
}
