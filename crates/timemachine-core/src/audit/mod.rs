//! Audit Logger.
//!
//! Append-only, hash-chained record of every orchestration operation. The
//! logger is an owned value wrapping an injectable [`AuditSink`]; the chain
//! can be recomputed from whatever the sink hands back.
//!
//! ```text
//! entry_hash(n) = sha256(canonical_json(seq, timestamp, operation, actor,
//!                                       tags, outcome, detail,
//!                                       prev_entry_hash = entry_hash(n-1)))
//! ```
//!
//! The first entry chains from [`GENESIS_HASH`].

pub mod chain;
pub mod entry;
pub mod logger;
pub mod sink;

pub use chain::{verify_entries, ChainReport};
pub use entry::{AuditEntry, AuditEvent, AuditOperation, AuditOutcome, GENESIS_HASH};
pub use logger::AuditLogger;
pub use sink::{AuditSink, MemoryAuditSink};
