//! TimeMachine Core - domain kernel for coordinated repository snapshots
//!
//! A repository mixes small text assets, versioned by a text backend, with
//! large binary assets, versioned by a content-hash-addressed large-object
//! backend. This crate holds everything about that coordination that does
//! not touch a real substrate:
//!
//! - Version tag construction, parsing and ordering
//! - Snapshot Record, Diff Report, Verification Result data model
//! - Backend capability traits and in-memory substrates
//! - Diff merging across both backends
//! - The Verifier and its fixed set of check kinds
//! - The hash-chained audit logger
//! - Configuration model and validation
//! - Error and logging facilities
//!
//! Persistence and the git/DVC adapters live in `timemachine-store`;
//! orchestration lives in `timemachine-engine`.

pub mod audit;
pub mod backend;
pub mod config;
pub mod context;
pub mod diff;
pub mod digest;
pub mod errors;
pub mod ledger;
pub mod logging_facility;
pub mod model;
pub mod paths;
pub mod process;
pub mod tag;
pub mod verify;

pub use timemachine_core_types as core_types;

// Re-export commonly used types
pub use audit::{
    AuditEntry, AuditEvent, AuditLogger, AuditOperation, AuditOutcome, AuditSink, MemoryAuditSink,
};
pub use backend::{
    LargeObjectBackend, ManifestRef, MemoryLargeObjectBackend, MemoryTextBackend, TextBackend,
    TextRef,
};
pub use config::TimeMachineConfig;
pub use context::{CancelToken, OperationContext};
pub use errors::{ExError, ExErrorKind, ExResult, Result, TimeMachineError};
pub use ledger::{MemoryLedger, SnapshotLedger};
pub use model::{
    BackendStatus, DiffReport, RestoreResult, RestoreState, SnapshotRecord, VerificationResult,
};
pub use tag::{Clock, FixedClock, SystemClock, TagScheme, VersionTag};
