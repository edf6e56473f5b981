//! Schema migrations for the state database
//!
//! Each migration is embedded at compile time and recorded in
//! `schema_version` together with the SHA-256 of its SQL. Editing a
//! migration after it shipped is refused at open time rather than leaving
//! two databases with the same version and different schemas.

mod runner;

pub use runner::{applied_migrations, apply_migrations};

use sha2::{Digest, Sha256};

pub(crate) struct Migration {
    pub id: &'static str,
    pub sql: &'static str,
}

impl Migration {
    pub fn checksum(&self) -> String {
        hex::encode(Sha256::digest(self.sql.as_bytes()))
    }
}

/// In application order
pub(crate) const MIGRATIONS: &[Migration] = &[
    Migration {
        id: "001_snapshot_ledger",
        sql: include_str!("../../migrations/001_snapshot_ledger.sql"),
    },
    Migration {
        id: "002_audit_log",
        sql: include_str!("../../migrations/002_audit_log.sql"),
    },
];
