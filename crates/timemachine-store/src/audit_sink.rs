//! SQLite-backed audit sink
//!
//! Rows are insert-only; triggers in the schema reject UPDATE and DELETE.

use crate::errors::{corrupt_row, from_rusqlite, poisoned, Result};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::sync::Mutex;
use timemachine_core::audit::{AuditEntry, AuditOperation, AuditOutcome, AuditSink};
use timemachine_core::errors::TimeMachineError;

const COLUMNS: &str =
    "seq, timestamp, operation, actor, tags, outcome, detail, prev_entry_hash, entry_hash";

#[derive(Debug)]
pub struct SqliteAuditSink {
    conn: Mutex<Connection>,
}

impl SqliteAuditSink {
    /// Wrap a migrated connection
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| poisoned("audit connection"))
    }
}

struct RawEntry {
    seq: i64,
    timestamp: String,
    operation: String,
    actor: String,
    tags: String,
    outcome: String,
    detail: Option<String>,
    prev_entry_hash: String,
    entry_hash: String,
}

impl RawEntry {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            seq: row.get(0)?,
            timestamp: row.get(1)?,
            operation: row.get(2)?,
            actor: row.get(3)?,
            tags: row.get(4)?,
            outcome: row.get(5)?,
            detail: row.get(6)?,
            prev_entry_hash: row.get(7)?,
            entry_hash: row.get(8)?,
        })
    }

    fn into_entry(self) -> Result<AuditEntry> {
        let operation = AuditOperation::parse(&self.operation).ok_or_else(|| {
            corrupt_row("audit_log", format!("unknown operation '{}'", self.operation))
        })?;
        let outcome = AuditOutcome::parse(&self.outcome).ok_or_else(|| {
            corrupt_row("audit_log", format!("unknown outcome '{}'", self.outcome))
        })?;
        let tags: Vec<String> =
            serde_json::from_str(&self.tags).map_err(|e| corrupt_row("audit_log", e))?;
        let detail: Option<serde_json::Value> = self
            .detail
            .as_deref()
            .map(serde_json::from_str)
            .transpose()
            .map_err(|e| corrupt_row("audit_log", e))?;
        let seq = u64::try_from(self.seq).map_err(|e| corrupt_row("audit_log", e))?;
        Ok(AuditEntry {
            seq,
            timestamp: self.timestamp,
            operation,
            actor: self.actor,
            tags,
            outcome,
            detail,
            prev_entry_hash: self.prev_entry_hash,
            entry_hash: self.entry_hash,
        })
    }
}

impl AuditSink for SqliteAuditSink {
    fn append(&self, entry: &AuditEntry) -> Result<()> {
        let tags = serde_json::to_string(&entry.tags)
            .map_err(TimeMachineError::from)?;
        let detail = entry
            .detail
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(TimeMachineError::from)?;
        let conn = self.lock()?;
        conn.execute(
            &format!(
                "INSERT INTO audit_log ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                COLUMNS
            ),
            params![
                entry.seq as i64,
                entry.timestamp,
                entry.operation.as_str(),
                entry.actor,
                tags,
                entry.outcome.as_str(),
                detail,
                entry.prev_entry_hash,
                entry.entry_hash,
            ],
        )
        .map_err(|e| from_rusqlite(e).with_op("audit_append").with_audit_seq(entry.seq))?;
        Ok(())
    }

    fn entries(&self) -> Result<Vec<AuditEntry>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&format!("SELECT {} FROM audit_log ORDER BY seq", COLUMNS))
            .map_err(from_rusqlite)?;
        let raws = stmt
            .query_map([], RawEntry::from_row)
            .map_err(from_rusqlite)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(from_rusqlite)?;
        raws.into_iter().map(RawEntry::into_entry).collect()
    }

    fn last(&self) -> Result<Option<AuditEntry>> {
        let conn = self.lock()?;
        let raw = conn
            .query_row(
                &format!("SELECT {} FROM audit_log ORDER BY seq DESC LIMIT 1", COLUMNS),
                [],
                RawEntry::from_row,
            )
            .optional()
            .map_err(from_rusqlite)?;
        raw.map(RawEntry::into_entry).transpose()
    }
}
