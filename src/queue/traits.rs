//! Event log traits and error types
//!
//! The crawler only needs to append payloads to a topic and the persister only
//! needs to read a topic in order under a consumer group, so the transport is
//! reduced to these two seams.

use async_trait::async_trait;
use thiserror::Error;

/// Errors that can occur while talking to the event log
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Event log connection lock poisoned")]
    Poisoned,
}

/// Result type for event log operations
pub type QueueResult<T> = Result<T, QueueError>;

/// One record read from a topic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Topic the record was published to
    pub topic: String,

    /// Position of the record in the log. Increases with every append.
    pub offset: i64,

    /// Raw payload bytes as published
    pub payload: Vec<u8>,

    /// RFC 3339 timestamp of the append
    pub published_at: String,
}

/// Appends payloads to a topic
///
/// Implementations are shared by every per-URL task, so `publish` takes
/// `&self`.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, topic: &str, payload: &[u8]) -> QueueResult<()>;
}

/// One member's resumable read position on a topic for a consumer group
///
/// Delivery is at-least-once: a record handed out by `next_message` is
/// delivered again after a restart unless it was passed to `commit`. Members
/// of one group split the records between them.
#[async_trait]
pub trait Subscription: Send {
    /// Waits for the next record no other member of the group holds
    async fn next_message(&mut self) -> QueueResult<Message>;

    /// Records that `message` has been handled
    ///
    /// The group's committed offset moves past it once every earlier record
    /// is committed as well.
    async fn commit(&mut self, message: &Message) -> QueueResult<()>;
}
