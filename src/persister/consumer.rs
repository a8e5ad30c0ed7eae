//! Consumer loop moving check results from the event log into storage
//!
//! Records are handled in delivery order, one insert per record, and
//! committed only after they were stored, dead-lettered or dropped as
//! unusable. A storage outage stalls the loop on the pending record until the
//! database is back or shutdown is requested.

use crate::check::CheckResult;
use crate::queue::{Message, Publisher, QueueResult, Subscription};
use crate::storage::{ResultStore, StorageResult};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Doublings of the retry delay are capped here whatever `max_retries` says
const MAX_BACKOFF_SHIFT: u32 = 16;

/// What happened to one consumed record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Inserted into storage
    Stored,
    /// Could not be stored and was published to the dead-letter topic
    DeadLettered,
    /// Could not be stored and there was nowhere to send it
    Dropped,
}

/// Counts of handled records by disposition
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsumerStats {
    pub stored: u64,
    pub dead_lettered: u64,
    pub dropped: u64,
}

impl ConsumerStats {
    fn record(&mut self, disposition: Disposition) {
        match disposition {
            Disposition::Stored => self.stored += 1,
            Disposition::DeadLettered => self.dead_lettered += 1,
            Disposition::Dropped => self.dropped += 1,
        }
    }

    /// Total number of handled records
    pub fn handled(&self) -> u64 {
        self.stored + self.dead_lettered + self.dropped
    }
}

struct DeadLetter {
    publisher: Arc<dyn Publisher>,
    topic: String,
}

/// Reads one topic under one consumer group and writes every record to `S`
pub struct Consumer<S: ResultStore> {
    store: S,
    subscription: Box<dyn Subscription>,
    dead_letter: Option<DeadLetter>,
    max_retries: u32,
    retry_delay: Duration,
    stats: ConsumerStats,
}

impl<S: ResultStore> Consumer<S> {
    /// Creates a consumer without dead-lettering
    pub fn new(store: S, subscription: Box<dyn Subscription>) -> Self {
        Self {
            store,
            subscription,
            dead_letter: None,
            max_retries: 0,
            retry_delay: DEFAULT_RETRY_DELAY,
            stats: ConsumerStats::default(),
        }
    }

    /// Routes records that can never be stored to `topic`
    pub fn with_dead_letter(
        mut self,
        publisher: Arc<dyn Publisher>,
        topic: impl Into<String>,
    ) -> Self {
        self.dead_letter = Some(DeadLetter {
            publisher,
            topic: topic.into(),
        });
        self
    }

    /// Sets the backoff for transient storage failures
    ///
    /// The first retry waits `retry_delay`. The delay doubles after every
    /// failed attempt, at most `max_retries` times, and retrying goes on
    /// until the insert succeeds or shutdown is requested.
    pub fn with_retries(mut self, max_retries: u32, retry_delay: Duration) -> Self {
        self.max_retries = max_retries;
        self.retry_delay = retry_delay;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn stats(&self) -> ConsumerStats {
        self.stats
    }

    /// Consumes records until `shutdown` becomes `true`
    ///
    /// A record is committed once it was handled. A record still waiting for
    /// storage at shutdown stays uncommitted and is delivered again later.
    /// Event log failures, including a failed dead-letter publish, end the
    /// loop with the current record uncommitted.
    pub async fn run(
        &mut self,
        mut shutdown: watch::Receiver<bool>,
    ) -> QueueResult<ConsumerStats> {
        loop {
            if *shutdown.borrow() {
                break;
            }

            let message = tokio::select! {
                message = self.subscription.next_message() => message?,
                _ = shutdown.changed() => break,
            };

            let Some(disposition) = self.handle(&message, &mut shutdown).await? else {
                tracing::info!(
                    "stopping with record {} of {} uncommitted",
                    message.offset,
                    message.topic
                );
                break;
            };
            self.stats.record(disposition);
            self.subscription.commit(&message).await?;
        }

        Ok(self.stats)
    }

    /// Decodes and stores one record
    ///
    /// Returns `Ok(None)` when shutdown was requested while storage was
    /// unavailable, and an error when the dead-letter publish failed. The
    /// record must not be committed in either case.
    pub async fn handle(
        &mut self,
        message: &Message,
        shutdown: &mut watch::Receiver<bool>,
    ) -> QueueResult<Option<Disposition>> {
        let result = match CheckResult::decode(&message.payload) {
            Ok(result) => result,
            Err(e) => {
                tracing::error!(
                    "malformed record {} on {}: {} (payload: {})",
                    message.offset,
                    message.topic,
                    e,
                    String::from_utf8_lossy(&message.payload)
                );
                return dead_letter(self.dead_letter.as_ref(), message).await.map(Some);
            }
        };

        match self.insert_until_stored(&result, shutdown).await {
            None => Ok(None),
            Some(Ok(())) => {
                tracing::info!("stored {}", result);
                Ok(Some(Disposition::Stored))
            }
            Some(Err(e)) => {
                tracing::error!(
                    "failed to store record {} for {}: {}",
                    message.offset,
                    result.url(),
                    e
                );
                dead_letter(self.dead_letter.as_ref(), message).await.map(Some)
            }
        }
    }

    /// Inserts `result`, waiting out transient failures
    ///
    /// Returns `None` if shutdown interrupts the wait, otherwise the outcome of
    /// the last attempt, which is never a transient error.
    async fn insert_until_stored(
        &mut self,
        result: &CheckResult,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Option<StorageResult<()>> {
        let mut attempt: u32 = 0;

        loop {
            match self.store.insert_result(result) {
                Ok(()) => return Some(Ok(())),
                Err(e) if e.is_transient() => {
                    attempt += 1;
                    let delay = self.backoff(attempt);
                    if attempt > self.max_retries {
                        tracing::error!(
                            "storage unavailable after {} attempts, retrying in {:?}: {}",
                            attempt,
                            delay,
                            e
                        );
                    } else {
                        tracing::warn!(
                            "transient storage error (retry {}/{}): {}",
                            attempt,
                            self.max_retries,
                            e
                        );
                    }

                    if *shutdown.borrow() {
                        return None;
                    }
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = shutdown.changed() => return None,
                    }

                    if let Err(e) = self.store.reconnect() {
                        tracing::warn!("reconnect failed: {}", e);
                    }
                }
                Err(e) => return Some(Err(e)),
            }
        }
    }

    fn backoff(&self, attempt: u32) -> Duration {
        let shift = attempt
            .saturating_sub(1)
            .min(self.max_retries)
            .min(MAX_BACKOFF_SHIFT);
        self.retry_delay.saturating_mul(1 << shift)
    }
}

async fn dead_letter(
    dead_letter: Option<&DeadLetter>,
    message: &Message,
) -> QueueResult<Disposition> {
    let Some(dead_letter) = dead_letter else {
        tracing::warn!(
            "dropping record {}: no dead-letter-topic configured",
            message.offset
        );
        return Ok(Disposition::Dropped);
    };

    match dead_letter
        .publisher
        .publish(&dead_letter.topic, &message.payload)
        .await
    {
        Ok(()) => {
            tracing::warn!(
                "record {} moved to dead-letter topic {}",
                message.offset,
                dead_letter.topic
            );
            Ok(Disposition::DeadLettered)
        }
        Err(e) => {
            tracing::error!(
                "failed to dead-letter record {}, leaving it uncommitted: {}",
                message.offset,
                e
            );
            Err(e)
        }
    }
}
