//! Subcommand implementations
//!
//! Every subcommand goes through `apply_engine_command`; mutating ones hold
//! the repository lock for their whole run.

pub mod diff;
pub mod list;
pub mod restore;
pub mod snapshot;

use serde::Serialize;
use std::path::Path;
use timemachine_core::context::OperationContext;
use timemachine_core::core_types::RequestId;
use timemachine_core::errors::ExError;
use timemachine_engine::{apply_engine_command, EngineCommand, EngineCommandResult, TimeMachine};
use timemachine_store::{RepoLock, StateLayout};

pub type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

pub struct Session {
    pub tm: TimeMachine,
    pub ctx: OperationContext,
    pub json: bool,
    layout: StateLayout,
}

impl Session {
    pub fn open(
        repo: &Path,
        actor: Option<&str>,
        request_id: Option<RequestId>,
        json: bool,
    ) -> CliResult<Self> {
        let tm = TimeMachine::open(repo)?;
        let actor = actor.unwrap_or(tm.config().actor.as_str()).to_string();
        let layout = StateLayout::new(repo, &tm.config().state_dir);
        let mut ctx = OperationContext::new(actor);
        if let Some(id) = request_id {
            ctx = ctx.with_request_id(id);
        }
        Ok(Self {
            tm,
            ctx,
            json,
            layout,
        })
    }

    /// Run one engine command, taking the repository lock when it mutates.
    pub fn run(&self, cmd: EngineCommand) -> CliResult<EngineCommandResult> {
        let _lock = if cmd.is_mutating() {
            Some(RepoLock::acquire(&self.layout.lock_file(), cmd.name())?)
        } else {
            None
        };
        Ok(apply_engine_command(cmd, &self.tm, &self.ctx)?)
    }

    pub fn print_json<T: Serialize>(&self, value: &T) -> CliResult<()> {
        println!("{}", serde_json::to_string_pretty(value)?);
        Ok(())
    }
}

pub fn unexpected(result: EngineCommandResult) -> Box<dyn std::error::Error> {
    format!("unexpected engine result: {:?}", result).into()
}

/// Loud notice for outcomes the time machine will not repair by itself.
pub fn print_remediation(err: &ExError) {
    eprintln!();
    eprintln!("!!! MANUAL REMEDIATION REQUIRED ({}) !!!", err.code());
    if let Some(record) = err.record() {
        eprintln!("  snapshot: {} ({})", record.tag, record.backend_status);
        eprintln!("  text ref: {}", record.text_ref);
        eprintln!("  manifest ref: {}", record.large_object_manifest_ref);
    }
    for tag in err.tags() {
        eprintln!("  tag: {}", tag);
    }
    if !err.audit_seqs().is_empty() {
        let seqs: Vec<String> = err.audit_seqs().iter().map(|s| s.to_string()).collect();
        eprintln!("  audit entries: {}", seqs.join(", "));
    }
    eprintln!("  Inspect both backends and reconcile them by hand before the next snapshot or restore.");
}
