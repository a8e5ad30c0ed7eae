//! Integration tests for the checker and persister pipeline
//!
//! These tests use wiremock to create mock HTTP servers and run both halves
//! of the pipeline end-to-end against temporary event log and result
//! databases.

use awm::check::{CheckOutcome, CheckResult};
use awm::config::{load_config, Config};
use awm::crawler::run_checker;
use awm::persister::{run_checker_with_persister, run_persister};
use awm::queue::SqliteEventLog;
use awm::storage::{ResultStore, SqliteStorage};
use awm::ConfigError;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::watch;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TOPIC: &str = "awm-results";
const DEAD_LETTER_TOPIC: &str = "awm-dead-letter";

/// Writes a config file for `urls` (TOML tables) into `dir` and loads it
fn create_test_config(dir: &Path, interval: u64, urls: &str) -> Config {
    let content = format!(
        r#"
[queue]
path = "{dir}/events.db"
topic = "{TOPIC}"
dead-letter-topic = "{DEAD_LETTER_TOPIC}"
poll-interval-ms = 50

[crawler]
interval = {interval}

{urls}

[storage]
database-path = "{dir}/results.db"
max-retries = 1
retry-delay-ms = 10
"#,
        dir = dir.display(),
    );

    let config_path = dir.join("config.toml");
    std::fs::write(&config_path, content).expect("Failed to write config");
    load_config(&config_path).expect("Failed to load config")
}

fn stored_count(db_path: &Path) -> u64 {
    if !db_path.exists() {
        return 0;
    }
    SqliteStorage::new(db_path)
        .and_then(|storage| storage.count_results())
        .unwrap_or(0)
}

fn database_path(config: &Config) -> PathBuf {
    PathBuf::from(&config.storage.database_path)
}

/// Runs checker and persister until at least `expected` rows are stored
async fn run_pipeline_until_stored(config: &Config, expected: u64) -> SqliteStorage {
    let db_path = database_path(config);
    let (tx, rx) = watch::channel(false);

    let driver = async {
        for _ in 0..100 {
            tokio::time::sleep(Duration::from_millis(100)).await;
            if stored_count(&db_path) >= expected {
                break;
            }
        }
        tx.send(true).unwrap();
    };

    let (checker, persister, ()) = tokio::join!(
        run_checker(config, rx.clone()),
        run_persister(config, rx),
        driver
    );
    checker.expect("checker failed");
    persister.expect("persister failed");

    SqliteStorage::new(&db_path).expect("Failed to open result database")
}

#[tokio::test]
async fn test_successful_checks_are_stored() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404).set_body_string("not here"))
        .mount(&mock_server)
        .await;

    let dir = TempDir::new().unwrap();
    let root = format!("{}/", base_url);
    let missing = format!("{}/missing", base_url);
    let config = create_test_config(
        dir.path(),
        10,
        &format!(
            "[crawler.urls.\"{root}\"]\n\n[crawler.urls.\"{missing}\"]\npattern = \"ok\"\n"
        ),
    );

    let storage = run_pipeline_until_stored(&config, 2).await;

    // 200 without a body: success, no pattern flag
    let rows = storage.results_for_url(&root, 10).unwrap();
    assert_eq!(rows.len(), 1);
    let row = &rows[0];
    assert_eq!(row.status, CheckOutcome::Successful);
    assert_eq!(row.response_status, Some(200));
    assert_eq!(row.response_regex_status, None);
    assert!(row.end_time.is_some());
    assert!(row.response_time.is_some());
    assert_eq!(row.status_message, None);

    // HTTP errors are still successful checks
    let rows = storage.results_for_url(&missing, 10).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].status, CheckOutcome::Successful);
    assert_eq!(rows[0].response_status, Some(404));
    assert_eq!(rows[0].response_regex_status, Some(false));

    // Every published payload is a valid check result
    let log = SqliteEventLog::open(Path::new(&config.queue.path)).unwrap();
    let published = log.read_all(TOPIC).unwrap();
    assert_eq!(published.len(), 2);
    for message in published {
        CheckResult::decode(&message.payload).expect("published payload should decode");
    }
}

#[tokio::test]
async fn test_pattern_match_is_stored() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200).set_body_string("status: こんにちは"))
        .mount(&mock_server)
        .await;

    let dir = TempDir::new().unwrap();
    let url = format!("{}/health", mock_server.uri());
    let config = create_test_config(
        dir.path(),
        10,
        &format!("[crawler.urls.\"{url}\"]\npattern = \".*にち.*\"\n"),
    );

    let storage = run_pipeline_until_stored(&config, 1).await;

    let rows = storage.results_for_url(&url, 1).unwrap();
    assert_eq!(rows[0].response_regex_status, Some(true));
}

#[tokio::test]
async fn test_connection_refused_is_client_error() {
    // Bind then drop to get a port nothing listens on
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let dir = TempDir::new().unwrap();
    let url = format!("http://127.0.0.1:{}/", port);
    let config = create_test_config(dir.path(), 10, &format!("[crawler.urls.\"{url}\"]\n"));

    let storage = run_pipeline_until_stored(&config, 1).await;

    let rows = storage.results_for_url(&url, 10).unwrap();
    assert!(!rows.is_empty());
    let row = &rows[0];
    assert_eq!(row.status, CheckOutcome::ClientError);
    assert!(!row.status_message.as_deref().unwrap_or_default().is_empty());
    assert_eq!(row.end_time, None);
    assert_eq!(row.response_time, None);
    assert_eq!(row.response_status, None);
    assert_eq!(row.response_regex_status, None);
}

#[tokio::test]
async fn test_slow_response_is_timeout() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
        .mount(&mock_server)
        .await;

    let dir = TempDir::new().unwrap();
    let url = format!("{}/slow", mock_server.uri());
    // The request timeout equals the global interval
    let config = create_test_config(dir.path(), 1, &format!("[crawler.urls.\"{url}\"]\n"));

    let storage = run_pipeline_until_stored(&config, 1).await;

    let rows = storage.results_for_url(&url, 10).unwrap();
    assert!(!rows.is_empty());
    for row in rows {
        assert_eq!(row.status, CheckOutcome::Timeout);
        assert!(row.status_message.is_some());
        assert_eq!(row.response_status, None);
    }
}

#[tokio::test]
async fn test_malformed_payload_is_dead_lettered() {
    let dir = TempDir::new().unwrap();
    let config = create_test_config(dir.path(), 10, "");
    let db_path = database_path(&config);

    let log = SqliteEventLog::open(Path::new(&config.queue.path)).unwrap();
    log.append(TOPIC, b"{\"url\": \"http://a\"").unwrap();
    let now = chrono::Utc::now();
    log.append(
        TOPIC,
        &CheckResult::client_error("http://b", now, "refused").encode(),
    )
    .unwrap();

    let (tx, rx) = watch::channel(false);
    let driver = async {
        for _ in 0..100 {
            tokio::time::sleep(Duration::from_millis(100)).await;
            if stored_count(&db_path) >= 1 && log.topic_len(DEAD_LETTER_TOPIC).unwrap() >= 1 {
                break;
            }
        }
        tx.send(true).unwrap();
    };

    let (stats, ()) = tokio::join!(run_persister(&config, rx), driver);
    let stats = stats.expect("persister failed");

    assert_eq!(stats.stored, 1);
    assert_eq!(stats.dead_lettered, 1);

    let dead = log.read_all(DEAD_LETTER_TOPIC).unwrap();
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].payload, b"{\"url\": \"http://a\"");

    let storage = SqliteStorage::new(&db_path).unwrap();
    let rows = storage.results_for_url("http://b", 1).unwrap();
    assert_eq!(rows[0].status, CheckOutcome::ClientError);
    assert_eq!(rows[0].status_message.as_deref(), Some("refused"));
}

#[tokio::test]
async fn test_persister_failure_stops_in_process_pipeline() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let dir = TempDir::new().unwrap();
    let url = format!("http://127.0.0.1:{}/", port);
    let mut config = create_test_config(dir.path(), 1, &format!("[crawler.urls.\"{url}\"]\n"));

    // The result database lives under a regular file, so the persister
    // cannot start while the checker would keep running
    let blocker = dir.path().join("blocker");
    std::fs::write(&blocker, "not a directory").unwrap();
    config.storage.database_path = blocker.join("results.db").display().to_string();

    let (_tx, rx) = watch::channel(false);
    let result = tokio::time::timeout(
        Duration::from_secs(10),
        run_checker_with_persister(&config, rx),
    )
    .await
    .expect("pipeline should stop when the persister fails");

    assert!(result.is_err());
}

#[test]
fn test_invalid_url_in_config_is_rejected() {
    let dir = TempDir::new().unwrap();
    let config_path = dir.path().join("config.toml");
    std::fs::write(
        &config_path,
        r#"
[queue]
path = "events.db"
topic = "awm-results"

[crawler]
interval = 30

[crawler.urls."ftp://example.com"]

[storage]
database-path = "results.db"
"#,
    )
    .unwrap();

    let err = load_config(&config_path).unwrap_err();
    assert!(matches!(err, ConfigError::InvalidUrl(_)));
}

#[test]
fn test_missing_config_is_not_found() {
    let dir = TempDir::new().unwrap();
    let err = load_config(&dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, ConfigError::NotFound(_)));
}
