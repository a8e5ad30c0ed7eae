//! Durable event log between the checker and the persister
//!
//! This module provides:
//! - The [`Publisher`] and [`Subscription`] seams used by the crawler and the
//!   persister
//! - [`SqliteEventLog`], an append-only log with per-topic ordering and
//!   committed offsets per consumer group

mod sqlite;
mod traits;

pub use sqlite::{SqliteEventLog, SqliteSubscription, EVENT_LOG_SCHEMA_SQL};
pub use traits::{Message, Publisher, QueueError, QueueResult, Subscription};

use crate::config::QueueConfig;
use std::path::Path;

/// Opens the event log described by the `[queue]` config section
pub fn open_event_log(config: &QueueConfig) -> QueueResult<SqliteEventLog> {
    if let Some(tls) = config.enabled_tls() {
        tracing::warn!(
            "TLS material configured (ca-file {:?}) but the event log at {} is a local file; TLS is not applied",
            tls.ca_file,
            config.path
        );
    }

    let log =
        SqliteEventLog::open(Path::new(&config.path))?.with_poll_interval(config.poll_interval());
    tracing::info!("event log opened ({})", config.path);
    Ok(log)
}
