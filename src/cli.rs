//! Pieces shared by the `awm-checker` and `awm-persister` binaries
//!
//! - Common command line flags
//! - Logging setup from `-v`/`-q`
//! - The shutdown signal fed by SIGINT/SIGTERM

use crate::config::{default_config_path, load_config_with_hash, Config};
use crate::ConfigError;
use clap::Args;
use std::path::PathBuf;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

/// Flags accepted by every binary
#[derive(Args, Debug, Clone)]
pub struct CommonArgs {
    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Path to TOML configuration file
    #[arg(short, long, value_name = "CONFIG", default_value_os_t = default_config_path())]
    pub config: PathBuf,
}

impl CommonArgs {
    /// Loads the configuration file, logging the outcome
    pub fn load_config(&self) -> Result<Config, ConfigError> {
        tracing::info!("Loading configuration from: {}", self.config.display());
        match load_config_with_hash(&self.config) {
            Ok((config, hash)) => {
                tracing::info!("Configuration loaded successfully (hash: {})", hash);
                Ok(config)
            }
            Err(e) => {
                tracing::error!("Failed to load configuration: {}", e);
                Err(e)
            }
        }
    }
}

/// Log filter for the given verbosity
pub fn log_filter(verbose: u8, quiet: bool) -> EnvFilter {
    if quiet {
        // Only show errors
        return EnvFilter::new("error");
    }

    match verbose {
        0 => EnvFilter::new("warn"),
        1 => EnvFilter::new("awm=info,warn"),
        2 => EnvFilter::new("awm=debug,info"),
        _ => EnvFilter::new("trace"),
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
pub fn setup_logging(args: &CommonArgs) {
    tracing_subscriber::fmt()
        .with_env_filter(log_filter(args.verbose, args.quiet))
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Returns a receiver that flips to `true` on SIGINT or SIGTERM
///
/// Must be called from within a tokio runtime.
pub fn shutdown_signal() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);

    tokio::spawn(async move {
        wait_for_signal().await;
        tracing::info!("Shutdown signal received, stopping");
        let _ = tx.send(true);
    });

    rx
}

async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
