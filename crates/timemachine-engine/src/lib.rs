//! TimeMachine Engine - Orchestration layer
//!
//! Coordinates the text backend, the large-object backend, the snapshot
//! ledger and the audit log. The [`TimeMachine`] facade is the only public
//! entry point and exposes exactly four operations: `snapshot`, `list`,
//! `diff` and `restore`.

pub mod commands;
pub mod machine;

pub use commands::engine_command::{apply_engine_command, EngineCommand, EngineCommandResult};
pub use commands::restore::RestoreOptions;
pub use machine::{TimeMachine, TimeMachineParts};
