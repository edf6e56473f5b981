//! Constructors for the errors this crate raises
//!
//! Everything persistent (SQLite, migrations, manifest blobs, decoded rows)
//! fails as `Persistence`; raw filesystem trouble as `Io`. Backend adapters
//! build their own `BackendUnavailable` / `BackendTimeout` errors.

use timemachine_core::errors::{ExError, ExErrorKind};

pub type Result<T> = std::result::Result<T, ExError>;

fn persistence(op: impl Into<String>, message: String) -> ExError {
    ExError::new(ExErrorKind::Persistence)
        .with_op(op)
        .with_message(message)
}

pub fn migration_error(migration_id: &str, reason: &str) -> ExError {
    persistence("migration", format!("Migration {} failed: {}", migration_id, reason))
}

/// An applied migration whose SQL has since changed
pub fn checksum_mismatch(migration_id: &str, recorded: &str, embedded: &str) -> ExError {
    persistence(
        "migration_checksum",
        format!(
            "Checksum mismatch for migration {}: recorded {}, embedded {}",
            migration_id, recorded, embedded
        ),
    )
}

/// Stored blob bytes do not hash to the digest they are filed under
pub fn cas_collision(digest: &str) -> ExError {
    persistence(
        "manifest_store",
        format!("Manifest blob collision: content under {} does not match its digest", digest),
    )
}

pub fn cas_missing(digest: &str) -> ExError {
    persistence("manifest_store", format!("Manifest blob {} not found", digest))
}

pub fn from_rusqlite(err: rusqlite::Error) -> ExError {
    persistence("sqlite", err.to_string())
}

pub fn io_error(op: &str, err: std::io::Error) -> ExError {
    ExError::new(ExErrorKind::Io)
        .with_op(op)
        .with_message(err.to_string())
}

/// A stored row that no longer decodes into its model type
pub fn corrupt_row(table: &str, reason: impl std::fmt::Display) -> ExError {
    persistence(
        format!("read_{}", table),
        format!("Corrupt row in {}: {}", table, reason),
    )
}

pub fn poisoned(what: &str) -> ExError {
    ExError::new(ExErrorKind::Internal).with_message(format!("{} lock poisoned", what))
}
