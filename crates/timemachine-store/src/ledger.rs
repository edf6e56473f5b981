//! SQLite-backed Snapshot Record ledger

use crate::errors::{corrupt_row, from_rusqlite, poisoned, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::sync::Mutex;
use timemachine_core::errors::{ExError, ExErrorKind};
use timemachine_core::ledger::{sort_newest_first, SnapshotLedger};
use timemachine_core::model::{BackendStatus, ManifestRef, SnapshotRecord, TextRef};
use timemachine_core::tag::{parse_tag, VersionTag};

const COLUMNS: &str =
    "tag, created_at, reason, risk_level, text_ref, manifest_ref, backend_status";

#[derive(Debug)]
pub struct SqliteLedger {
    conn: Mutex<Connection>,
}

impl SqliteLedger {
    /// Wrap a migrated connection
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| poisoned("ledger connection"))
    }
}

struct RawRecord {
    tag: String,
    created_at: String,
    reason: String,
    risk_level: String,
    text_ref: String,
    manifest_ref: String,
    backend_status: String,
}

impl RawRecord {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            tag: row.get(0)?,
            created_at: row.get(1)?,
            reason: row.get(2)?,
            risk_level: row.get(3)?,
            text_ref: row.get(4)?,
            manifest_ref: row.get(5)?,
            backend_status: row.get(6)?,
        })
    }

    fn into_record(self) -> Result<SnapshotRecord> {
        let tag = parse_tag(&self.tag).map_err(|e| corrupt_row("snapshots", e))?;
        let created_at = DateTime::parse_from_rfc3339(&self.created_at)
            .map_err(|e| corrupt_row("snapshots", e))?
            .with_timezone(&Utc);
        let backend_status = BackendStatus::parse(&self.backend_status).ok_or_else(|| {
            corrupt_row(
                "snapshots",
                format!("unknown backend_status '{}'", self.backend_status),
            )
        })?;
        Ok(SnapshotRecord {
            tag,
            created_at,
            reason: self.reason,
            risk_level: self.risk_level,
            text_ref: TextRef(self.text_ref),
            large_object_manifest_ref: ManifestRef(self.manifest_ref),
            backend_status,
        })
    }
}

impl SnapshotLedger for SqliteLedger {
    fn insert(&self, record: &SnapshotRecord) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            &format!(
                "INSERT INTO snapshots ({}, category) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                COLUMNS
            ),
            params![
                record.tag.to_string(),
                record
                    .created_at
                    .to_rfc3339_opts(SecondsFormat::Micros, true),
                record.reason,
                record.risk_level,
                record.text_ref.as_str(),
                record.large_object_manifest_ref.as_str(),
                record.backend_status.as_str(),
                record.tag.category(),
            ],
        )
        .map_err(|e| from_rusqlite(e).with_tag(record.tag.to_string()))?;
        Ok(())
    }

    fn update_status(&self, tag: &VersionTag, status: BackendStatus) -> Result<()> {
        let conn = self.lock()?;
        let changed = conn
            .execute(
                "UPDATE snapshots SET backend_status = ?1 WHERE tag = ?2",
                params![status.as_str(), tag.to_string()],
            )
            .map_err(from_rusqlite)?;
        if changed == 0 {
            return Err(ExError::new(ExErrorKind::UnknownVersion)
                .with_op("ledger_update_status")
                .with_tag(tag.to_string()));
        }
        Ok(())
    }

    fn remove(&self, tag: &VersionTag) -> Result<()> {
        let conn = self.lock()?;
        conn.execute("DELETE FROM snapshots WHERE tag = ?1", [tag.to_string()])
            .map_err(|e| from_rusqlite(e).with_tag(tag.to_string()))?;
        Ok(())
    }

    fn get(&self, tag: &VersionTag) -> Result<Option<SnapshotRecord>> {
        let conn = self.lock()?;
        let raw = conn
            .query_row(
                &format!("SELECT {} FROM snapshots WHERE tag = ?1", COLUMNS),
                [tag.to_string()],
                RawRecord::from_row,
            )
            .optional()
            .map_err(from_rusqlite)?;
        raw.map(RawRecord::into_record).transpose()
    }

    fn list(&self, category: Option<&str>) -> Result<Vec<SnapshotRecord>> {
        let conn = self.lock()?;
        let raws: Vec<RawRecord> = match category {
            Some(category) => {
                let mut stmt = conn
                    .prepare(&format!(
                        "SELECT {} FROM snapshots WHERE category = ?1",
                        COLUMNS
                    ))
                    .map_err(from_rusqlite)?;
                let rows = stmt
                    .query_map([category], RawRecord::from_row)
                    .map_err(from_rusqlite)?
                    .collect::<std::result::Result<Vec<_>, _>>()
                    .map_err(from_rusqlite)?;
                rows
            }
            None => {
                let mut stmt = conn
                    .prepare(&format!("SELECT {} FROM snapshots", COLUMNS))
                    .map_err(from_rusqlite)?;
                let rows = stmt
                    .query_map([], RawRecord::from_row)
                    .map_err(from_rusqlite)?
                    .collect::<std::result::Result<Vec<_>, _>>()
                    .map_err(from_rusqlite)?;
                rows
            }
        };
        let mut records = raws
            .into_iter()
            .map(RawRecord::into_record)
            .collect::<Result<Vec<_>>>()?;
        sort_newest_first(&mut records);
        Ok(records)
    }
}
