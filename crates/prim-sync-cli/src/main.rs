mod commands;
mod config;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use crate::commands::sync_all::ProcessStageRunner;

#[derive(Parser)]
#[command(name = "prim-sync")]
#[command(about = "Keep local copies of open-data exports and API specs in sync")]
struct Cli {
    /// Configuration file (defaults to ./prim-sync.toml, then the user config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch OpenAPI specs declared in apis.yml
    SyncSpecs {
        /// Show what would be fetched without touching the network or disk
        #[arg(long)]
        dry_run: bool,
    },
    /// Generate Python clients for specs whose content changed
    GenerateClients {
        /// Print the generator commands without running them
        #[arg(long)]
        dry_run: bool,
    },
    /// Download dataset exports declared in datasets.yml
    SyncDatasets {
        /// Show what would be fetched without touching the network or disk
        #[arg(long)]
        dry_run: bool,
    },
    /// Validate downloaded datasets against their schemas
    ValidateDatasets {
        /// List the datasets that would be validated
        #[arg(long)]
        dry_run: bool,
        /// Invalid records tolerated per dataset (defaults to max_validation_errors)
        #[arg(long, value_name = "N")]
        max_errors: Option<usize>,
    },
    /// Run every stage in its own process: specs, clients, datasets, validation
    SyncAll {
        /// Pass --dry-run to every stage
        #[arg(long)]
        dry_run: bool,
    },
    /// Re-sync datasets periodically until interrupted
    Watch {
        /// Seconds between refreshes (defaults to refresh_interval_secs)
        #[arg(long)]
        interval: Option<u64>,
        /// Show what would be fetched on each refresh
        #[arg(long)]
        dry_run: bool,
    },
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::INFO,
        1 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };
    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .with_env_var("PRIM_SYNC_LOG")
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let app_config = config::load_config(cli.config.as_deref())?;

    match cli.command {
        Command::SyncSpecs { dry_run } => commands::sync_specs::run(&app_config, dry_run).await,
        Command::GenerateClients { dry_run } => {
            commands::generate_clients::run(&app_config, dry_run).await
        }
        Command::SyncDatasets { dry_run } => {
            commands::sync_datasets::run(&app_config, dry_run).await
        }
        Command::ValidateDatasets {
            dry_run,
            max_errors,
        } => commands::validate_datasets::run(&app_config, dry_run, max_errors).await,
        Command::SyncAll { dry_run } => {
            let runner = ProcessStageRunner::current(cli.config, cli.verbose)?;
            commands::sync_all::run(&runner, dry_run).await
        }
        Command::Watch { interval, dry_run } => {
            commands::watch::run(&app_config, interval, dry_run).await
        }
    }
}
