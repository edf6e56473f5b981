//! TimeMachine CLI
//!
//! Command-line interface for coordinated text + large-object snapshots

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use timemachine_core::core_types::RequestId;
use timemachine_core::errors::ExError;
use timemachine_core::logging_facility::{self, Profile};

mod commands;

#[derive(Debug, Parser)]
#[command(name = "tm")]
#[command(about = "TimeMachine - Versioned snapshots of config, scripts and models", long_about = None)]
struct Cli {
    /// Repository root
    #[arg(long, global = true, default_value = ".")]
    repo: PathBuf,

    /// Actor recorded in audit entries (defaults to the configured actor)
    #[arg(long, global = true)]
    actor: Option<String>,

    /// Correlation id to reuse instead of generating one
    #[arg(long, global = true)]
    request_id: Option<RequestId>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Logging profile written to stderr: dev or json
    #[arg(long, global = true)]
    log: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Record a coordinated snapshot of tracked files and large objects
    Snapshot(commands::snapshot::SnapshotArgs),
    /// List snapshots, newest first
    List(commands::list::ListArgs),
    /// Compare two snapshots
    Diff(commands::diff::DiffArgs),
    /// Bring the workspace back to a snapshot
    Restore(commands::restore::RestoreArgs),
}

fn main() {
    let cli = Cli::parse();

    if let Some(name) = &cli.log {
        match Profile::parse(name) {
            Some(profile) => logging_facility::init(profile),
            None => {
                eprintln!("Error: unknown log profile '{}'", name);
                std::process::exit(2);
            }
        }
    }

    let result = commands::Session::open(&cli.repo, cli.actor.as_deref(), cli.request_id, cli.json).and_then(
        |session| match cli.command {
            Commands::Snapshot(args) => commands::snapshot::execute(args, &session),
            Commands::List(args) => commands::list::execute(args, &session),
            Commands::Diff(args) => commands::diff::execute(args, &session),
            Commands::Restore(args) => commands::restore::execute(args, &session),
        },
    );

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        if let Some(ex) = e.downcast_ref::<ExError>() {
            if ex.requires_operator() {
                commands::print_remediation(ex);
                std::process::exit(3);
            }
        }
        std::process::exit(1);
    }
}
