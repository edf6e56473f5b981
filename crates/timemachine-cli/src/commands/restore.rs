//! Restore command

use super::{unexpected, CliResult, Session};
use clap::Args;
use timemachine_core::model::CheckOutcome;
use timemachine_engine::{EngineCommand, EngineCommandResult, RestoreOptions};

#[derive(Debug, Args)]
pub struct RestoreArgs {
    /// Snapshot tag to restore
    pub tag: String,

    /// Run the verifier even when the category does not require it
    #[arg(long)]
    pub verify: bool,

    /// Restore over uncommitted changes
    #[arg(long)]
    pub force: bool,
}

pub fn execute(args: RestoreArgs, session: &Session) -> CliResult<()> {
    let cmd = EngineCommand::Restore {
        tag: args.tag,
        options: RestoreOptions {
            require_verify: args.verify,
            force: args.force,
        },
    };
    let result = match session.run(cmd)? {
        EngineCommandResult::Restore(result) => result,
        other => return Err(unexpected(other)),
    };

    if session.json {
        return session.print_json(&result);
    }
    println!("Restored {} ({})", result.tag, result.state.as_str());
    if let Some(verification) = &result.verification {
        for check in &verification.checks_run {
            let outcome = match check.outcome {
                CheckOutcome::Pass => "pass",
                CheckOutcome::Fail => "FAIL",
                CheckOutcome::Skipped => "skipped",
            };
            println!("  {:<24} {}", check.name, outcome);
        }
    }
    Ok(())
}
