// tests/archive_integration.rs

//! The SQLite archive end to end: `ArchivedStore` feeding real writers,
//! then reading the rows back.

use chrono::{DateTime, TimeDelta, Utc};
use rusqlite::Connection;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use feedwatch::config::DatabaseConfig;
use feedwatch::db::{self, connection, maintenance};
use feedwatch::model::{
    Alert, AlertId, AlertKind, AlertStatus, AnalysisOutcome, FeedId, OutcomePayload, Severity,
};
use feedwatch::store::{ArchiveSinks, ArchivedStore, FeedStore, MemoryStore};

fn db_cfg() -> DatabaseConfig {
    DatabaseConfig {
        enable: true,
        path: "archive.db".into(),
        flush_interval_ms: 20,
        batch_size: 16,
        queue_capacity: 64,
        ..DatabaseConfig::default()
    }
}

fn outcome(seq: u64, at: DateTime<Utc>) -> AnalysisOutcome {
    AnalysisOutcome {
        feed_id: FeedId::from("cam-1"),
        model: "motion-detection".into(),
        frame_seq: seq,
        success: true,
        confidence: 0.42,
        payload: OutcomePayload::Empty,
        error: None,
        processing_time: Duration::from_millis(15),
        timestamp: at,
    }
}

fn alert(id: u64, status: AlertStatus, at: DateTime<Utc>) -> Alert {
    Alert {
        id: AlertId(id),
        kind: AlertKind::Detection,
        severity: Severity::Medium,
        status,
        feed_id: Some(FeedId::from("cam-1")),
        title: format!("motion-detection detections #{id}"),
        payload: serde_json::json!({ "count": 1 }),
        created_at: at,
        updated_at: at,
        expires_at: None,
        occurrences: 1,
        last_actor: None,
    }
}

/// Wire an archived store to two writers; returns the store and the writer tasks.
fn archived(dir: &Path, cfg: &DatabaseConfig) -> (ArchivedStore<Arc<MemoryStore>>, Vec<tokio::task::JoinHandle<()>>) {
    let path = connection::db_path(dir, cfg);
    let c1 = connection::init_database(dir, cfg).unwrap();
    let c2 = connection::open_db_connection(&path, cfg).unwrap();
    let (otx, orx) = mpsc::channel(cfg.queue_capacity);
    let (atx, arx) = mpsc::channel(cfg.queue_capacity);
    let tasks = vec![db::spawn_writer(c1, orx, cfg), db::spawn_writer(c2, arx, cfg)];
    let store = ArchivedStore::new(Arc::new(MemoryStore::new()), ArchiveSinks { outcomes: otx, alerts: atx });
    (store, tasks)
}

fn count(conn: &Connection, table: &str) -> i64 {
    conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |r| r.get(0)).unwrap()
}

#[tokio::test]
async fn outcomes_and_alert_history_land_in_sqlite() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = db_cfg();
    let (store, tasks) = archived(dir.path(), &cfg);
    let now = Utc::now();

    for seq in 1..=3 {
        store.save_analysis_outcome(&outcome(seq, now)).await.unwrap();
    }
    let mut a = alert(1, AlertStatus::Active, now);
    store.create_or_refresh_alert(&a).await.unwrap();
    a.occurrences = 2;
    store.create_or_refresh_alert(&a).await.unwrap();
    store.transition_alert(AlertId(1), AlertStatus::Resolved, "ops").await.unwrap();

    assert_eq!(store.inner().outcomes().len(), 3);
    drop(store);
    futures::future::join_all(tasks).await;

    let conn = Connection::open(connection::db_path(dir.path(), &cfg)).unwrap();
    assert_eq!(count(&conn, "analysis_results"), 3);
    let seqs: Vec<i64> = conn
        .prepare("SELECT frame_seq FROM analysis_results ORDER BY id")
        .unwrap()
        .query_map([], |r| r.get(0))
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(seqs, vec![1, 2, 3]);

    let (status, occurrences, actor): (String, i64, Option<String>) = conn
        .query_row("SELECT status, occurrences, last_actor FROM alerts WHERE id = 1", [], |r| {
            Ok((r.get(0)?, r.get(1)?, r.get(2)?))
        })
        .unwrap();
    assert_eq!(status, "resolved");
    assert_eq!(occurrences, 2);
    assert_eq!(actor.as_deref(), Some("ops"));
}

#[tokio::test]
async fn ttl_purge_keeps_recent_rows_and_open_alerts() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = db_cfg();
    let (store, tasks) = archived(dir.path(), &cfg);
    let now = Utc::now();
    let old = now - TimeDelta::days(10);

    store.save_analysis_outcome(&outcome(1, old)).await.unwrap();
    store.save_analysis_outcome(&outcome(2, now)).await.unwrap();
    store.create_or_refresh_alert(&alert(1, AlertStatus::Resolved, old)).await.unwrap();
    store.create_or_refresh_alert(&alert(2, AlertStatus::Active, old)).await.unwrap();
    drop(store);
    futures::future::join_all(tasks).await;

    let path = connection::db_path(dir.path(), &cfg);
    let removed = maintenance::purge_older_than(&path, 7 * 24 * 3600 * 1_000_000).unwrap();
    assert_eq!(removed, 2);

    let conn = Connection::open(&path).unwrap();
    assert_eq!(count(&conn, "analysis_results"), 1);
    let left: i64 = conn.query_row("SELECT id FROM alerts", [], |r| r.get(0)).unwrap();
    assert_eq!(left, 2);
}

#[tokio::test]
async fn reopening_keeps_the_archive_unless_purge_on_restart() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = db_cfg();
    {
        let (store, tasks) = archived(dir.path(), &cfg);
        store.save_analysis_outcome(&outcome(1, Utc::now())).await.unwrap();
        drop(store);
        futures::future::join_all(tasks).await;
    }

    let conn = connection::init_database(dir.path(), &cfg).unwrap();
    assert_eq!(count(&conn, "analysis_results"), 1);
    drop(conn);

    cfg.purge_on_restart = true;
    let conn = connection::init_database(dir.path(), &cfg).unwrap();
    assert_eq!(count(&conn, "analysis_results"), 0);
}
