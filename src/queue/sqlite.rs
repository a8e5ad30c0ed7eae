//! SQLite-backed event log
//!
//! Every topic is an append-only sequence of rows in one `events` table.
//! Consumer groups keep their committed position in `consumer_offsets`, so a
//! restarted consumer resumes right after the last record it committed.
//!
//! Members of one group share the backlog. `next_message` claims a record in
//! `consumer_claims` inside an immediate transaction, so two members never hold
//! the same record at once. A claim that is dropped without a commit, or that
//! outlives the claim timeout, makes the record deliverable again.

use crate::queue::traits::{Message, Publisher, QueueError, QueueResult, Subscription};
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// SQL schema for the event log
pub const EVENT_LOG_SCHEMA_SQL: &str = r#"
-- Append-only record log, ordered by id within each topic
CREATE TABLE IF NOT EXISTS events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    topic TEXT NOT NULL,
    payload BLOB NOT NULL,
    published_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_events_topic ON events(topic, id);

-- Last committed offset per topic and consumer group. Every record up to
-- and including it has been handled.
CREATE TABLE IF NOT EXISTS consumer_offsets (
    topic TEXT NOT NULL,
    group_id TEXT NOT NULL,
    last_offset INTEGER NOT NULL,
    committed_at TEXT NOT NULL,
    PRIMARY KEY (topic, group_id)
);

-- Records past the committed offset that a group member holds or has handled
CREATE TABLE IF NOT EXISTS consumer_claims (
    topic TEXT NOT NULL,
    group_id TEXT NOT NULL,
    event_id INTEGER NOT NULL,
    member_id TEXT NOT NULL,
    claimed_at INTEGER NOT NULL,
    committed INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (topic, group_id, event_id)
);
"#;

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);
const DEFAULT_CLAIM_TIMEOUT: Duration = Duration::from_secs(300);

static NEXT_MEMBER: AtomicU64 = AtomicU64::new(1);

/// Handle to an event log database
///
/// Cloning is cheap and every clone shares the same connection, so one log
/// can back the publisher and any number of subscriptions in one process.
#[derive(Clone)]
pub struct SqliteEventLog {
    conn: Arc<Mutex<Connection>>,
    poll_interval: Duration,
    claim_timeout: Duration,
}

impl SqliteEventLog {
    /// Opens (or creates) the event log at `path`
    pub fn open(path: &Path) -> QueueResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;

        // The checker and the persister open the same file from two processes
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
        ",
        )?;
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute_batch(EVENT_LOG_SCHEMA_SQL)?;

        Ok(Self::from_connection(conn))
    }

    /// Creates a private in-memory log, shared only by clones of the handle
    pub fn open_in_memory() -> QueueResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(EVENT_LOG_SCHEMA_SQL)?;
        Ok(Self::from_connection(conn))
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
            poll_interval: DEFAULT_POLL_INTERVAL,
            claim_timeout: DEFAULT_CLAIM_TIMEOUT,
        }
    }

    /// Sets how long an idle subscription sleeps before polling again
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Sets how long an uncommitted claim blocks other group members
    ///
    /// Claims of a member that exits cleanly are released at once. The timeout
    /// only matters for members that crash while holding a record.
    pub fn with_claim_timeout(mut self, claim_timeout: Duration) -> Self {
        self.claim_timeout = claim_timeout;
        self
    }

    /// Appends a payload to `topic` and returns its offset
    pub fn append(&self, topic: &str, payload: &[u8]) -> QueueResult<i64> {
        let now = Utc::now().to_rfc3339();
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO events (topic, payload, published_at) VALUES (?1, ?2, ?3)",
                params![topic, payload, now],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    /// Joins `group_id` on `topic` as a new member
    ///
    /// The member receives records after the group's committed offset that no
    /// other live member holds.
    pub fn subscribe(&self, topic: &str, group_id: &str) -> QueueResult<SqliteSubscription> {
        let position = self.committed_offset(topic, group_id)?;
        let member_id = format!(
            "{}-{}-{}",
            std::process::id(),
            Utc::now().timestamp_millis(),
            NEXT_MEMBER.fetch_add(1, Ordering::Relaxed)
        );
        tracing::info!(
            "subscribed to {} as {} member {} (resuming after offset {})",
            topic,
            group_id,
            member_id,
            position
        );

        Ok(SqliteSubscription {
            log: self.clone(),
            topic: topic.to_string(),
            group_id: group_id.to_string(),
            member_id,
        })
    }

    /// The last committed offset of `group_id` on `topic`, 0 if none
    pub fn committed_offset(&self, topic: &str, group_id: &str) -> QueueResult<i64> {
        self.with_conn(|conn| committed_offset_in(conn, topic, group_id))
    }

    /// Number of records ever appended to `topic`
    pub fn topic_len(&self, topic: &str) -> QueueResult<u64> {
        let count: i64 = self.with_conn(|conn| {
            conn.query_row(
                "SELECT COUNT(*) FROM events WHERE topic = ?1",
                params![topic],
                |row| row.get(0),
            )
        })?;
        Ok(count as u64)
    }

    /// Reads every record of `topic` in order (for inspection and tests)
    pub fn read_all(&self, topic: &str) -> QueueResult<Vec<Message>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, topic, payload, published_at FROM events WHERE topic = ?1 ORDER BY id",
            )?;
            let messages = stmt
                .query_map(params![topic], message_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(messages)
        })
    }

    /// Claims the oldest record of `topic` that no member of the group holds
    fn claim_next(
        &self,
        topic: &str,
        group_id: &str,
        member_id: &str,
    ) -> QueueResult<Option<Message>> {
        let now = Utc::now().timestamp_millis();
        let expired_before = now.saturating_sub(self.claim_timeout.as_millis() as i64);

        self.with_conn(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let committed = committed_offset_in(&tx, topic, group_id)?;

            let message = tx
                .query_row(
                    "SELECT e.id, e.topic, e.payload, e.published_at FROM events e
                     LEFT JOIN consumer_claims c
                         ON c.topic = e.topic AND c.group_id = ?2 AND c.event_id = e.id
                     WHERE e.topic = ?1 AND e.id > ?3
                       AND (c.event_id IS NULL OR (c.committed = 0 AND c.claimed_at < ?4))
                     ORDER BY e.id LIMIT 1",
                    params![topic, group_id, committed, expired_before],
                    message_from_row,
                )
                .optional()?;

            if let Some(message) = &message {
                tx.execute(
                    "INSERT INTO consumer_claims (topic, group_id, event_id, member_id, claimed_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)
                     ON CONFLICT(topic, group_id, event_id) DO UPDATE SET
                         member_id = excluded.member_id,
                         claimed_at = excluded.claimed_at",
                    params![topic, group_id, message.offset, member_id, now],
                )?;
            }

            tx.commit()?;
            Ok(message)
        })
    }

    /// Marks `offset` handled and moves the committed offset over every
    /// contiguous handled record. Returns the group's committed offset.
    fn commit_claim(
        &self,
        topic: &str,
        group_id: &str,
        member_id: &str,
        offset: i64,
    ) -> QueueResult<i64> {
        let now_ms = Utc::now().timestamp_millis();
        let now = Utc::now().to_rfc3339();

        self.with_conn(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let committed = committed_offset_in(&tx, topic, group_id)?;

            tx.execute(
                "INSERT INTO consumer_claims
                     (topic, group_id, event_id, member_id, claimed_at, committed)
                 VALUES (?1, ?2, ?3, ?4, ?5, 1)
                 ON CONFLICT(topic, group_id, event_id) DO UPDATE SET committed = 1",
                params![topic, group_id, offset, member_id, now_ms],
            )?;

            // Oldest record past the committed offset still waiting to be handled
            let first_open: Option<i64> = tx.query_row(
                "SELECT MIN(e.id) FROM events e
                 LEFT JOIN consumer_claims c
                     ON c.topic = e.topic AND c.group_id = ?2 AND c.event_id = e.id
                 WHERE e.topic = ?1 AND e.id > ?3 AND COALESCE(c.committed, 0) = 0",
                params![topic, group_id, committed],
                |row| row.get(0),
            )?;

            let handled: Option<i64> = tx.query_row(
                "SELECT MAX(event_id) FROM consumer_claims
                 WHERE topic = ?1 AND group_id = ?2 AND committed = 1 AND event_id < ?3",
                params![topic, group_id, first_open.unwrap_or(i64::MAX)],
                |row| row.get(0),
            )?;

            let committed = handled.map_or(committed, |handled| handled.max(committed));
            tx.execute(
                "INSERT INTO consumer_offsets (topic, group_id, last_offset, committed_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(topic, group_id) DO UPDATE SET
                     last_offset = MAX(last_offset, excluded.last_offset),
                     committed_at = excluded.committed_at",
                params![topic, group_id, committed, now],
            )?;
            tx.execute(
                "DELETE FROM consumer_claims
                 WHERE topic = ?1 AND group_id = ?2 AND event_id <= ?3",
                params![topic, group_id, committed],
            )?;

            tx.commit()?;
            Ok(committed)
        })
    }

    /// Drops the uncommitted claims of one member
    fn release_claims(&self, topic: &str, group_id: &str, member_id: &str) -> QueueResult<usize> {
        self.with_conn(|conn| {
            conn.execute(
                "DELETE FROM consumer_claims
                 WHERE topic = ?1 AND group_id = ?2 AND member_id = ?3 AND committed = 0",
                params![topic, group_id, member_id],
            )
        })
    }

    fn with_conn<T>(
        &self,
        f: impl FnOnce(&mut Connection) -> rusqlite::Result<T>,
    ) -> QueueResult<T> {
        let mut conn = self.conn.lock().map_err(|_| QueueError::Poisoned)?;
        Ok(f(&mut conn)?)
    }
}

fn committed_offset_in(conn: &Connection, topic: &str, group_id: &str) -> rusqlite::Result<i64> {
    let offset = conn
        .query_row(
            "SELECT last_offset FROM consumer_offsets WHERE topic = ?1 AND group_id = ?2",
            params![topic, group_id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(offset.unwrap_or(0))
}

fn message_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    Ok(Message {
        offset: row.get(0)?,
        topic: row.get(1)?,
        payload: row.get(2)?,
        published_at: row.get(3)?,
    })
}

#[async_trait]
impl Publisher for SqliteEventLog {
    async fn publish(&self, topic: &str, payload: &[u8]) -> QueueResult<()> {
        let offset = self.append(topic, payload)?;
        tracing::trace!("appended record {} to {}", offset, topic);
        Ok(())
    }
}

/// One member of a consumer group reading one topic
///
/// Dropping the subscription releases the records it claimed but never
/// committed, so the next member (or a restart) receives them again.
pub struct SqliteSubscription {
    log: SqliteEventLog,
    topic: String,
    group_id: String,
    member_id: String,
}

impl SqliteSubscription {
    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn group_id(&self) -> &str {
        &self.group_id
    }

    pub fn member_id(&self) -> &str {
        &self.member_id
    }
}

#[async_trait]
impl Subscription for SqliteSubscription {
    async fn next_message(&mut self) -> QueueResult<Message> {
        loop {
            if let Some(message) =
                self.log
                    .claim_next(&self.topic, &self.group_id, &self.member_id)?
            {
                return Ok(message);
            }
            tokio::time::sleep(self.log.poll_interval).await;
        }
    }

    async fn commit(&mut self, message: &Message) -> QueueResult<()> {
        let committed =
            self.log
                .commit_claim(&self.topic, &self.group_id, &self.member_id, message.offset)?;
        tracing::trace!(
            "committed record {} of {} ({} committed up to {})",
            message.offset,
            self.topic,
            self.group_id,
            committed
        );
        Ok(())
    }
}

impl Drop for SqliteSubscription {
    fn drop(&mut self) {
        match self
            .log
            .release_claims(&self.topic, &self.group_id, &self.member_id)
        {
            Ok(0) => {}
            Ok(released) => tracing::debug!(
                "member {} released {} uncommitted records of {}",
                self.member_id,
                released,
                self.topic
            ),
            Err(e) => tracing::warn!(
                "member {} could not release its claims on {}: {}",
                self.member_id,
                self.topic,
                e
            ),
        }
    }
}
