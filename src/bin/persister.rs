//! awm-persister entry point
//!
//! Consumes check results from the event log and stores them in the database.

use anyhow::Context;
use awm::cli::{setup_logging, shutdown_signal, CommonArgs};
use awm::persister::{run_persister, show_statistics};
use clap::Parser;
use std::process::ExitCode;

/// AWM persister: store check results in the database
#[derive(Parser, Debug)]
#[command(name = "awm-persister")]
#[command(version)]
#[command(about = "Store website check results in the database", long_about = None)]
struct Cli {
    #[command(flatten)]
    common: CommonArgs,

    /// Show statistics from the database and exit
    #[arg(long)]
    stats: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    setup_logging(&cli.common);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = cli.common.load_config()?;

    if cli.stats {
        return show_statistics(&config.storage).context("failed to load statistics");
    }

    run_persister(&config, shutdown_signal())
        .await
        .context("persister failed")?;

    Ok(())
}
