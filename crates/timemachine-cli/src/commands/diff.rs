//! Diff command

use super::{unexpected, CliResult, Session};
use clap::Args;
use timemachine_core::diff::render_summary;
use timemachine_engine::{EngineCommand, EngineCommandResult};

#[derive(Debug, Args)]
pub struct DiffArgs {
    /// Older snapshot tag
    pub tag_a: String,

    /// Newer snapshot tag
    pub tag_b: String,

    /// Also print per-file text deltas
    #[arg(long)]
    pub patch: bool,
}

pub fn execute(args: DiffArgs, session: &Session) -> CliResult<()> {
    let cmd = EngineCommand::Diff {
        tag_a: args.tag_a,
        tag_b: args.tag_b,
    };
    let report = match session.run(cmd)? {
        EngineCommandResult::Diff(report) => report,
        other => return Err(unexpected(other)),
    };

    if session.json {
        return session.print_json(&report);
    }
    print!("{}", render_summary(&report));
    if args.patch {
        for change in report.text_changes.iter().filter(|c| !c.binary) {
            print!("{}", change.text_delta);
        }
    }
    Ok(())
}
