//! TimeMachine Store - persistence and concrete substrates
//!
//! Provides:
//! - SQLite database with embedded, checksummed migrations
//! - Snapshot Record ledger and append-only audit sink on SQLite
//! - Content-addressed manifest store for the large-object backend
//! - Git text backend and DVC large-object backend
//! - YAML configuration loading
//! - Advisory repository lock

pub mod audit_sink;
pub mod backend;
pub mod cas;
pub mod config;
pub mod db;
pub mod errors;
pub mod layout;
pub mod ledger;
pub mod lock;
pub mod migrations;

// Re-export key types
pub use audit_sink::SqliteAuditSink;
pub use backend::{DvcBackend, GitBackend};
pub use errors::Result;
pub use layout::StateLayout;
pub use ledger::SqliteLedger;
pub use lock::RepoLock;
