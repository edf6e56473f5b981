//! Engine-level commands as data.
//!
//! Front ends (the CLI, scripted callers) build an [`EngineCommand`] and hand
//! it to [`apply_engine_command`], which dispatches to the facade.

use crate::commands::restore::RestoreOptions;
use crate::machine::TimeMachine;
use timemachine_core::context::OperationContext;
use timemachine_core::errors::ExResult;
use timemachine_core::model::{DiffReport, RestoreResult, SnapshotRecord};

/// The four public operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineCommand {
    Snapshot {
        reason: String,
        risk_level: String,
    },
    List {
        /// Only records of this category
        category: Option<String>,
    },
    Diff {
        tag_a: String,
        tag_b: String,
    },
    Restore {
        tag: String,
        options: RestoreOptions,
    },
}

impl EngineCommand {
    pub fn name(&self) -> &'static str {
        match self {
            EngineCommand::Snapshot { .. } => "snapshot",
            EngineCommand::List { .. } => "list",
            EngineCommand::Diff { .. } => "diff",
            EngineCommand::Restore { .. } => "restore",
        }
    }

    /// Whether the command mutates the repository and needs the
    /// single-writer lock
    pub fn is_mutating(&self) -> bool {
        matches!(
            self,
            EngineCommand::Snapshot { .. } | EngineCommand::Restore { .. }
        )
    }
}

/// Result of applying an engine command
#[derive(Debug, Clone)]
pub enum EngineCommandResult {
    Snapshot(SnapshotRecord),
    List(Vec<SnapshotRecord>),
    Diff(DiffReport),
    Restore(RestoreResult),
}

/// Apply an engine command against `tm`.
///
/// # Errors
///
/// Whatever the dispatched operation returns.
pub fn apply_engine_command(
    cmd: EngineCommand,
    tm: &TimeMachine,
    ctx: &OperationContext,
) -> ExResult<EngineCommandResult> {
    match cmd {
        EngineCommand::Snapshot { reason, risk_level } => tm
            .snapshot(ctx, &reason, &risk_level)
            .map(EngineCommandResult::Snapshot),
        EngineCommand::List { category } => tm
            .list(ctx, category.as_deref())
            .map(EngineCommandResult::List),
        EngineCommand::Diff { tag_a, tag_b } => tm
            .diff(ctx, &tag_a, &tag_b)
            .map(EngineCommandResult::Diff),
        EngineCommand::Restore { tag, options } => tm
            .restore(ctx, &tag, options)
            .map(EngineCommandResult::Restore),
    }
}
