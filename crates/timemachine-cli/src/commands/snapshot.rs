//! Snapshot command

use super::{unexpected, CliResult, Session};
use clap::Args;
use timemachine_engine::{EngineCommand, EngineCommandResult};

#[derive(Debug, Args)]
pub struct SnapshotArgs {
    /// Why the snapshot is taken
    #[arg(long)]
    pub reason: String,

    /// Risk level of the upcoming change (selects the category)
    #[arg(long, default_value = "normal")]
    pub risk_level: String,
}

pub fn execute(args: SnapshotArgs, session: &Session) -> CliResult<()> {
    let cmd = EngineCommand::Snapshot {
        reason: args.reason,
        risk_level: args.risk_level,
    };
    let record = match session.run(cmd)? {
        EngineCommandResult::Snapshot(record) => record,
        other => return Err(unexpected(other)),
    };

    if session.json {
        return session.print_json(&record);
    }
    println!("Snapshot committed:");
    println!("  tag: {}", record.tag);
    println!("  text_ref: {}", record.text_ref);
    println!("  manifest_ref: {}", record.large_object_manifest_ref);
    Ok(())
}
