//! Crawler module for periodic URL checks
//!
//! This module contains the checking half of the pipeline, including:
//! - HTTP fetching and outcome classification
//! - One timed loop per configured URL
//! - Publishing every result to the event log

mod fetcher;
mod scheduler;

pub use fetcher::{build_http_client, fetch_url, pattern_status, Fetch, HttpFetcher};
pub use scheduler::{next_sleep, CheckTarget, Scheduler};

use crate::config::{Config, CrawlerConfig};
use crate::{ConfigError, ConfigResult};
use regex::Regex;
use std::sync::Arc;
use tokio::sync::watch;

/// Builds the check targets for every configured URL
///
/// Per-URL intervals override the global one and patterns are compiled once
/// here. Empty patterns are dropped.
pub fn check_targets(config: &CrawlerConfig) -> ConfigResult<Vec<CheckTarget>> {
    let default_interval = config.interval();

    config
        .urls
        .iter()
        .map(|(url, url_config)| {
            let pattern = url_config
                .pattern()
                .map(Regex::new)
                .transpose()
                .map_err(|e| {
                    ConfigError::InvalidPattern(format!("pattern for '{}': {}", url, e))
                })?;

            Ok(CheckTarget {
                url: url.clone(),
                interval: url_config.effective_interval(default_interval),
                pattern,
            })
        })
        .collect()
}

/// Runs the checker until `shutdown` flips
///
/// This is the main entry point of `awm-checker`. It will:
/// 1. Open the event log
/// 2. Build the shared HTTP client, timing out after the global interval
/// 3. Start one check loop per configured URL
///
/// # Arguments
///
/// * `config` - The loaded configuration
/// * `shutdown` - Flips to `true` when the process should stop
pub async fn run_checker(config: &Config, shutdown: watch::Receiver<bool>) -> crate::Result<()> {
    let log = crate::queue::open_event_log(&config.queue)?;
    let fetcher = HttpFetcher::new(config.crawler.interval())?;
    let targets = check_targets(&config.crawler)?;

    if targets.is_empty() {
        tracing::warn!("no URLs configured, nothing to check");
    }

    Scheduler::new(
        targets,
        Arc::new(fetcher),
        Arc::new(log),
        config.queue.topic.clone(),
    )
    .run(shutdown)
    .await;

    Ok(())
}
