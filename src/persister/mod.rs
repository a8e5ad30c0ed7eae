//! Persister module writing consumed check results to storage
//!
//! This module contains the consuming half of the pipeline:
//! - The [`Consumer`] loop with its dead-letter and retry handling
//! - The `awm-persister` entry points
//! - The in-process pipeline behind `awm-checker --persist`

mod consumer;

pub use consumer::{Consumer, ConsumerStats, Disposition};

use crate::config::{Config, StorageConfig};
use crate::storage::{load_statistics, open_storage, print_statistics};
use std::sync::Arc;
use tokio::sync::watch;

/// Runs the persister until `shutdown` flips
///
/// This is the main entry point of `awm-persister`. It will:
/// 1. Open the event log and subscribe under the configured group
/// 2. Connect to the database and create the schema if needed
/// 3. Store every consumed record, dead-lettering what cannot be stored
///
/// # Returns
///
/// * `Ok(ConsumerStats)` - Counts of the records handled before shutdown
/// * `Err(AwmError)` - Startup failed or the event log became unusable
pub async fn run_persister(
    config: &Config,
    shutdown: watch::Receiver<bool>,
) -> crate::Result<ConsumerStats> {
    let log = crate::queue::open_event_log(&config.queue)?;
    let store = open_storage(&config.storage)?;
    let subscription = log.subscribe(&config.queue.topic, &config.queue.group_id)?;

    let mut consumer = Consumer::new(store, Box::new(subscription))
        .with_retries(config.storage.max_retries, config.storage.retry_delay());

    match &config.queue.dead_letter_topic {
        Some(topic) => {
            consumer = consumer.with_dead_letter(Arc::new(log.clone()), topic.clone());
        }
        None => tracing::warn!("no dead-letter-topic configured, unusable records are dropped"),
    }

    tracing::info!(
        "consuming topic {} as group {}",
        config.queue.topic,
        config.queue.group_id
    );

    let stats = consumer.run(shutdown).await?;

    tracing::info!(
        "persister stopped: {} stored, {} dead-lettered, {} dropped",
        stats.stored,
        stats.dead_lettered,
        stats.dropped
    );

    Ok(stats)
}

/// Runs the checker and the persister side by side until `shutdown` flips
///
/// The first of the two to fail ends both, and its error is returned.
pub async fn run_checker_with_persister(
    config: &Config,
    shutdown: watch::Receiver<bool>,
) -> crate::Result<()> {
    let checker = crate::crawler::run_checker(config, shutdown.clone());
    let persister = async {
        run_persister(config, shutdown).await?;
        Ok::<(), crate::AwmError>(())
    };

    tokio::try_join!(checker, persister)?;
    Ok(())
}

/// Prints per-status counts of the stored results
pub fn show_statistics(config: &StorageConfig) -> crate::Result<()> {
    let store = open_storage(config)?;
    let stats = load_statistics(&store)?;
    print_statistics(&stats);
    Ok(())
}
