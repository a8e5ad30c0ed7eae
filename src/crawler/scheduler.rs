//! Scheduler running one timed check loop per URL
//!
//! This module handles:
//! - Turning the crawler config into check targets
//! - One independent task per target, all sharing the fetcher and publisher
//! - Keeping a fixed nominal interval between the start of two checks
//! - Stopping every loop when the shutdown signal flips

use crate::check::CheckResult;
use crate::crawler::fetcher::Fetch;
use crate::queue::Publisher;
use regex::Regex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::Instant;

/// A URL together with its check settings
#[derive(Debug, Clone)]
pub struct CheckTarget {
    /// The URL to check
    pub url: String,

    /// Nominal time between the start of two checks
    pub interval: Duration,

    /// Compiled pattern searched for in the response body
    pub pattern: Option<Regex>,
}

/// Time left to wait after a tick that took `elapsed`
///
/// A check that ran longer than the interval starts the next one immediately.
pub fn next_sleep(interval: Duration, elapsed: Duration) -> Duration {
    interval.saturating_sub(elapsed)
}

/// Scheduler owns the check targets and runs their loops
pub struct Scheduler {
    targets: Vec<CheckTarget>,
    fetcher: Arc<dyn Fetch>,
    publisher: Arc<dyn Publisher>,
    topic: Arc<str>,
}

impl Scheduler {
    /// Creates a new scheduler
    ///
    /// # Arguments
    ///
    /// * `targets` - The URLs to check
    /// * `fetcher` - Shared fetcher used by every loop
    /// * `publisher` - Shared publisher used by every loop
    /// * `topic` - Topic every result is published to
    pub fn new(
        targets: Vec<CheckTarget>,
        fetcher: Arc<dyn Fetch>,
        publisher: Arc<dyn Publisher>,
        topic: impl Into<String>,
    ) -> Self {
        Self {
            targets,
            fetcher,
            publisher,
            topic: Arc::from(topic.into()),
        }
    }

    pub fn targets(&self) -> &[CheckTarget] {
        &self.targets
    }

    /// Runs every check loop until `shutdown` becomes `true`
    ///
    /// Returns once all loops have ended.
    pub async fn run(self, shutdown: watch::Receiver<bool>) {
        let mut tasks = JoinSet::new();

        for target in self.targets {
            tasks.spawn(check_loop(
                target,
                Arc::clone(&self.fetcher),
                Arc::clone(&self.publisher),
                Arc::clone(&self.topic),
                shutdown.clone(),
            ));
        }

        tracing::info!("scheduled {} check loops", tasks.len());

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                tracing::error!("check loop ended abnormally: {}", e);
            }
        }

        tracing::info!("all check loops stopped");
    }
}

async fn check_loop(
    target: CheckTarget,
    fetcher: Arc<dyn Fetch>,
    publisher: Arc<dyn Publisher>,
    topic: Arc<str>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        if *shutdown.borrow() {
            break;
        }

        let started = Instant::now();

        let result = tokio::select! {
            result = fetcher.fetch(&target.url, target.pattern.as_ref()) => result,
            _ = shutdown.changed() => break,
        };

        publish(publisher.as_ref(), &topic, &result).await;

        let wait = next_sleep(target.interval, started.elapsed());
        tracing::debug!(
            "waiting {:.2} s before checking {} again",
            wait.as_secs_f64(),
            target.url
        );

        tokio::select! {
            _ = tokio::time::sleep(wait) => {}
            _ = shutdown.changed() => break,
        }
    }

    tracing::debug!("check loop for {} stopped", target.url);
}

async fn publish(publisher: &dyn Publisher, topic: &str, result: &CheckResult) {
    match publisher.publish(topic, &result.encode()).await {
        Ok(()) => tracing::info!("{}", result),
        Err(e) => tracing::error!("failed to publish result for {}: {}", result.url(), e),
    }
}
