//! awm-checker entry point
//!
//! Periodically checks the configured URLs and publishes every result to the
//! event log.

use anyhow::Context;
use awm::cli::{setup_logging, shutdown_signal, CommonArgs};
use awm::config::Config;
use awm::crawler::{check_targets, run_checker};
use awm::persister::run_checker_with_persister;
use clap::Parser;
use std::process::ExitCode;

/// AWM checker: periodically monitor website availability
///
/// Every configured URL is checked on its own interval. Results are published
/// to the event log, from where `awm-persister` stores them.
#[derive(Parser, Debug)]
#[command(name = "awm-checker")]
#[command(version)]
#[command(about = "Periodically monitor website availability", long_about = None)]
struct Cli {
    #[command(flatten)]
    common: CommonArgs,

    /// Also run the persister in this process
    #[arg(long, conflicts_with = "dry_run")]
    persist: bool,

    /// Validate config and show what would be checked without checking
    #[arg(long)]
    dry_run: bool,
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

    if cli.dry_run {
        return handle_dry_run(&config);
    }

    let shutdown = shutdown_signal();

    if cli.persist {
        run_checker_with_persister(&config, shutdown)
            .await
            .context("checker or persister failed")?;
    } else {
        run_checker(&config, shutdown)
            .await
            .context("checker failed")?;
    }

    Ok(())
}

/// Handles the --dry-run mode: validates config and shows what would be checked
fn handle_dry_run(config: &Config) -> anyhow::Result<()> {
    println!("=== AWM Checker Dry Run ===\n");

    println!("Event log:");
    println!("  Path: {}", config.queue.path);
    println!("  Topic: {}", config.queue.topic);
    println!();

    let targets = check_targets(&config.crawler)?;
    println!("URLs ({}):", targets.len());
    for target in &targets {
        match &target.pattern {
            Some(pattern) => println!(
                "  - {} every {}s, pattern '{}'",
                target.url,
                target.interval.as_secs(),
                pattern
            ),
            None => println!("  - {} every {}s", target.url, target.interval.as_secs()),
        }
    }
    println!();
    println!("Request timeout: {}s", config.crawler.interval);

    Ok(())
}
