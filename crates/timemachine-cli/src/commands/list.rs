//! List command

use super::{unexpected, CliResult, Session};
use clap::Args;
use timemachine_engine::{EngineCommand, EngineCommandResult};

#[derive(Debug, Args)]
pub struct ListArgs {
    /// Only show snapshots in this category
    #[arg(long)]
    pub filter: Option<String>,
}

pub fn execute(args: ListArgs, session: &Session) -> CliResult<()> {
    let records = match session.run(EngineCommand::List {
        category: args.filter,
    })? {
        EngineCommandResult::List(records) => records,
        other => return Err(unexpected(other)),
    };

    if session.json {
        return session.print_json(&records);
    }
    if records.is_empty() {
        println!("No snapshots");
        return Ok(());
    }
    for record in &records {
        let flag = if record.is_complete() {
            String::new()
        } else {
            format!("  [{}]", record.backend_status)
        };
        println!(
            "{}  {}  {}  {}{}",
            record.tag,
            record.created_at.format("%Y-%m-%d %H:%M:%S"),
            record.risk_level,
            record.reason,
            flag
        );
    }
    Ok(())
}
