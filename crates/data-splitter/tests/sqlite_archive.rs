//! End-to-end archive runs against real SQLite database files.

use std::path::Path;
use std::sync::Arc;

use data_splitter::archive::NoopObserver;
use data_splitter::drivers::sqlite::SqliteSession;
use data_splitter::{ArchiveError, Config, Connection, Orchestrator, SqlValue};
use tempfile::TempDir;

const ORDERS_DDL: &str =
    "CREATE TABLE orders (id INTEGER PRIMARY KEY, created_at TEXT NOT NULL, note TEXT)";

/// Source with 3 orders in 2021, 5 in 2022 and 1 in 2023.
async fn create_source(path: &Path) {
    let db = SqliteSession::open(path, true).await.unwrap();
    db.execute(ORDERS_DDL, &[]).await.unwrap();
    let rows = [
        (1, "2021-01-15", "first"),
        (2, "2021-06-30", "second"),
        (3, "2021-12-31 23:59:59", "third"),
        (4, "2022-01-01", ""),
        (5, "2022-02-02", "fifth"),
        (6, "2022-03-03", "sixth"),
        (7, "2022-04-04", "seventh"),
        (8, "2022-05-05", "eighth"),
        (9, "2023-01-01", "ninth"),
    ];
    for (id, created_at, note) in rows {
        db.execute(
            "INSERT INTO orders (id, created_at, note) VALUES (?, ?, ?)",
            &[
                SqlValue::I64(id),
                SqlValue::from(created_at),
                SqlValue::from(note),
            ],
        )
        .await
        .unwrap();
    }
    db.close().await;
}

fn config(dir: &Path, options: &str) -> Config {
    let yaml = format!(
        r#"
database:
  type: sqlite
  source_db: "{}"
tables:
  - name: orders
    enabled: true
    split_column: created_at
    archive_pattern: "orders_{{year}}"
archive:
  years: [2021, 2022]
  options:
    batch_size: 2
{}
"#,
        dir.join("shop.db").display(),
        options
    );
    Config::from_yaml(&yaml).unwrap()
}

fn orchestrator(config: Config) -> Orchestrator {
    Orchestrator::new(config)
        .unwrap()
        .with_observer(Arc::new(NoopObserver))
}

async fn count(path: &Path, sql: &str) -> i64 {
    let db = SqliteSession::open(path, false).await.unwrap();
    let rows = db.query(sql, &[]).await.unwrap();
    db.close().await;
    rows[0].get_i64(0).unwrap()
}

#[tokio::test]
async fn test_archive_and_prune_round_trip() {
    let dir = TempDir::new().unwrap();
    create_source(&dir.path().join("shop.db")).await;
    let cfg = config(
        dir.path(),
        "    create_archive_db: true\n    delete_after_archive: true",
    );

    let summary = orchestrator(cfg).run().await.unwrap();

    assert_eq!(summary.status, "completed");
    assert_eq!(summary.succeeded, 2);
    assert_eq!(summary.rows_archived, 8);
    assert_eq!(summary.rows_pruned, 8);
    assert!(summary.table_years.iter().all(|t| t.table_created));
    assert_eq!(summary.table_years[1].batches, 3);

    let a2021 = dir.path().join("orders_2021.db");
    let a2022 = dir.path().join("orders_2022.db");
    assert_eq!(count(&a2021, "SELECT COUNT(*) FROM orders").await, 3);
    assert_eq!(count(&a2022, "SELECT COUNT(*) FROM orders").await, 5);

    // Empty text is archived as NULL
    assert_eq!(
        count(&a2022, "SELECT COUNT(*) FROM orders WHERE id = 4 AND note IS NULL").await,
        1
    );

    // Only the 2023 order is left in the source
    let source = dir.path().join("shop.db");
    assert_eq!(count(&source, "SELECT COUNT(*) FROM orders").await, 1);
    assert_eq!(count(&source, "SELECT id FROM orders").await, 9);
}

#[tokio::test]
async fn test_rerun_is_idempotent() {
    let dir = TempDir::new().unwrap();
    create_source(&dir.path().join("shop.db")).await;

    let first = orchestrator(config(dir.path(), "    create_archive_db: true"))
        .run()
        .await
        .unwrap();
    let second = orchestrator(config(dir.path(), "    create_archive_db: true"))
        .run()
        .await
        .unwrap();

    assert_eq!(first.rows_archived, second.rows_archived);
    assert!(second.table_years.iter().all(|t| !t.table_created));

    let a2022 = dir.path().join("orders_2022.db");
    assert_eq!(count(&a2022, "SELECT COUNT(*) FROM orders").await, 5);
    let source = dir.path().join("shop.db");
    assert_eq!(count(&source, "SELECT COUNT(*) FROM orders").await, 9);
}

#[tokio::test]
async fn test_validate_after_archive() {
    let dir = TempDir::new().unwrap();
    create_source(&dir.path().join("shop.db")).await;
    let cfg = config(dir.path(), "    create_archive_db: true");

    orchestrator(cfg.clone()).run().await.unwrap();
    let reports = orchestrator(cfg).validate().await.unwrap();

    assert_eq!(reports.len(), 2);
    assert!(reports.iter().all(|r| r.passed));
    assert_eq!(reports[1].source_count, Some(5));
    assert_eq!(reports[1].archive_count, Some(5));
}

#[tokio::test]
async fn test_missing_archive_is_not_created_without_flag() {
    let dir = TempDir::new().unwrap();
    create_source(&dir.path().join("shop.db")).await;

    let err = orchestrator(config(dir.path(), "")).run().await.unwrap_err();

    assert!(matches!(
        err,
        ArchiveError::Stage {
            stage: "connect_archive",
            year: 2021,
            ..
        }
    ));
    assert!(!dir.path().join("orders_2021.db").exists());
}

#[tokio::test]
async fn test_dry_run_touches_nothing() {
    let dir = TempDir::new().unwrap();
    let cfg = config(dir.path(), "    dry_run: true\n    create_archive_db: true");

    let summary = orchestrator(cfg).run().await.unwrap();

    assert_eq!(summary.skipped_dry_run, 2);
    assert!(!dir.path().join("shop.db").exists());
    assert!(!dir.path().join("orders_2021.db").exists());
}
