//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the ResultStore trait.

use crate::check::{CheckOutcome, CheckResult};
use crate::storage::schema::initialize_schema;
use crate::storage::statement::insert_statement;
use crate::storage::traits::{ResultStore, StorageError, StorageResult};
use crate::storage::ResultRecord;
use rusqlite::{params, params_from_iter, Connection};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
    /// `None` for in-memory databases
    path: Option<PathBuf>,
}

impl SqliteStorage {
    /// Opens (or creates) the database at `path` and initializes the schema
    pub fn new(path: &Path) -> StorageResult<Self> {
        let conn = open_connection(path)?;
        let mut storage = Self {
            conn,
            path: Some(path.to_path_buf()),
        };
        storage.initialize()?;
        Ok(storage)
    }

    /// Creates an initialized in-memory database
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        let mut storage = Self { conn, path: None };
        storage.initialize()?;
        Ok(storage)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

fn open_connection(path: &Path) -> StorageResult<Connection> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let conn = Connection::open(path)?;

    // Foreign keys back the status enum
    conn.execute_batch(
        "
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA foreign_keys = ON;
    ",
    )?;
    conn.busy_timeout(Duration::from_secs(5))?;

    Ok(conn)
}

fn record_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ResultRecord> {
    let status: String = row.get(6)?;
    let status = status.parse::<CheckOutcome>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(6, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok(ResultRecord {
        url: row.get(0)?,
        start_time: row.get(1)?,
        end_time: row.get(2)?,
        response_time: row.get(3)?,
        response_status: row.get(4)?,
        response_regex_status: row.get(5)?,
        status,
        status_message: row.get(7)?,
    })
}

impl ResultStore for SqliteStorage {
    fn initialize(&mut self) -> StorageResult<()> {
        initialize_schema(&self.conn)?;
        tracing::info!("database table setup done");
        Ok(())
    }

    fn insert_result(&mut self, result: &CheckResult) -> StorageResult<()> {
        let stmt = insert_statement(result);
        tracing::debug!("executing sql: {} with {:?}", stmt.sql, stmt.params);
        self.conn
            .execute(stmt.sql, params_from_iter(stmt.params.iter()))?;
        Ok(())
    }

    fn reconnect(&mut self) -> StorageResult<()> {
        let Some(path) = self.path.clone() else {
            // Reopening an in-memory database would lose it
            self.conn.execute_batch("SELECT 1;")?;
            return Ok(());
        };

        tracing::warn!("reconnecting to database {}", path.display());
        self.conn = open_connection(&path)?;
        self.initialize()
    }

    // ===== Queries =====

    fn count_results(&self) -> StorageResult<u64> {
        let count: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM crawler_results", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn count_by_status(&self) -> StorageResult<HashMap<CheckOutcome, u64>> {
        let mut stmt = self
            .conn
            .prepare("SELECT status, COUNT(*) FROM crawler_results GROUP BY status")?;

        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut counts = HashMap::new();
        for (status, count) in rows {
            let outcome = status
                .parse::<CheckOutcome>()
                .map_err(|e| StorageError::UnknownStatus(e.0))?;
            counts.insert(outcome, count as u64);
        }

        Ok(counts)
    }

    fn count_unique_urls(&self) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(DISTINCT url) FROM crawler_results",
            [],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn results_for_url(&self, url: &str, limit: usize) -> StorageResult<Vec<ResultRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT url, start_time, end_time, response_time, response_status,
             response_regex_status, status, status_message
             FROM crawler_results WHERE url = ?1
             ORDER BY start_time DESC, rowid DESC LIMIT ?2",
        )?;

        let rows = stmt
            .query_map(params![url, limit as i64], record_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration as ChronoDuration, TimeZone, Utc};
    use tempfile::TempDir;

    fn success_at(url: &str, second: u32) -> CheckResult {
        let start = Utc.with_ymd_and_hms(2020, 11, 1, 0, 0, second).unwrap();
        CheckResult::success(url, start, start + ChronoDuration::seconds(1), 200, Some(true))
    }

    #[test]
    fn test_insert_success_row() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        storage.insert_result(&success_at("http://a", 0)).unwrap();

        let rows = storage.results_for_url("http://a", 10).unwrap();
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.status, CheckOutcome::Successful);
        assert_eq!(row.start_time, "2020-11-01T00:00:00+00:00");
        assert_eq!(row.end_time.as_deref(), Some("2020-11-01T00:00:01+00:00"));
        assert_eq!(row.response_time, Some(1.0));
        assert_eq!(row.response_status, Some(200));
        assert_eq!(row.response_regex_status, Some(true));
        assert_eq!(row.status_message, None);
    }

    #[test]
    fn test_insert_failure_row_leaves_response_columns_null() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let result = CheckResult::timeout("http://a", Utc::now(), "timed out after 10s");
        storage.insert_result(&result).unwrap();

        let row = &storage.results_for_url("http://a", 1).unwrap()[0];
        assert_eq!(row.status, CheckOutcome::Timeout);
        assert_eq!(row.status_message.as_deref(), Some("timed out after 10s"));
        assert_eq!(row.end_time, None);
        assert_eq!(row.response_time, None);
        assert_eq!(row.response_status, None);
        assert_eq!(row.response_regex_status, None);
    }

    #[test]
    fn test_duplicate_results_produce_duplicate_rows() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let result = success_at("http://a", 0);
        storage.insert_result(&result).unwrap();
        storage.insert_result(&result).unwrap();

        assert_eq!(storage.count_results().unwrap(), 2);
        assert_eq!(storage.count_unique_urls().unwrap(), 1);
    }

    #[test]
    fn test_count_by_status() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        storage.insert_result(&success_at("http://a", 0)).unwrap();
        storage.insert_result(&success_at("http://b", 1)).unwrap();
        storage
            .insert_result(&CheckResult::client_error("http://c", Utc::now(), "refused"))
            .unwrap();

        let counts = storage.count_by_status().unwrap();
        assert_eq!(counts.get(&CheckOutcome::Successful), Some(&2));
        assert_eq!(counts.get(&CheckOutcome::ClientError), Some(&1));
        assert_eq!(counts.get(&CheckOutcome::Timeout), None);
    }

    #[test]
    fn test_results_for_url_newest_first_with_limit() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        for second in 0..5 {
            storage.insert_result(&success_at("http://a", second)).unwrap();
        }

        let rows = storage.results_for_url("http://a", 2).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].start_time, "2020-11-01T00:00:04+00:00");
        assert_eq!(rows[1].start_time, "2020-11-01T00:00:03+00:00");
    }

    #[test]
    fn test_reopen_and_reconnect_keep_rows() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("results.db");

        {
            let mut storage = SqliteStorage::new(&path).unwrap();
            storage.insert_result(&success_at("http://a", 0)).unwrap();
        }

        // Opening an initialized database runs the schema setup again
        let mut storage = SqliteStorage::new(&path).unwrap();
        assert_eq!(storage.count_results().unwrap(), 1);

        storage.reconnect().unwrap();
        storage.insert_result(&success_at("http://a", 1)).unwrap();
        assert_eq!(storage.count_results().unwrap(), 2);
        assert_eq!(storage.path(), Some(path.as_path()));
    }

    #[test]
    fn test_unknown_status_in_history_is_an_error() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        storage.insert_result(&success_at("http://a", 0)).unwrap();

        // Only reachable when the lookup table is bypassed
        storage
            .conn
            .execute_batch(
                "PRAGMA foreign_keys = OFF;
                 INSERT INTO crawler_results (url, start_time, status)
                 VALUES ('http://a', '2020-11-01T00:00:09+00:00', 'MAYBE');",
            )
            .unwrap();

        let err = storage.results_for_url("http://a", 10).unwrap_err();
        assert!(matches!(
            err,
            StorageError::Sqlite(rusqlite::Error::FromSqlConversionFailure(6, _, _))
        ));
    }
}
