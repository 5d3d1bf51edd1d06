// src/db/maintenance.rs
//! Periodic TTL cleanup & WAL checkpoint of the archive.

use std::{path::PathBuf, time::Duration};
use log::Level;
use rusqlite::Connection;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::DatabaseConfig;
use crate::feed_log;
use crate::tasks::spawn_periodic;

/// Delete archived outcomes older than `ttl_seconds`, plus terminal alerts
/// of the same age. Returns `None` when TTL cleanup is disabled.
pub fn spawn_ttl_cleanup(
    db_path: PathBuf,
    cfg: &DatabaseConfig,
    shutdown: CancellationToken,
) -> Option<JoinHandle<()>> {
    if cfg.ttl_seconds == 0 {
        return None;
    }
    let ttl_micros = cfg.ttl_seconds as i64 * 1_000_000;
    Some(spawn_periodic("archive-ttl", Duration::from_secs(60), shutdown, move || {
        let db_path = db_path.clone();
        async move {
            match tokio::task::spawn_blocking(move || purge_older_than(&db_path, ttl_micros)).await {
                Ok(Ok(n)) => feed_log!(Level::Debug, "db", "TTL cleanup removed {} archived row(s)", n),
                Ok(Err(e)) => feed_log!(Level::Warn, "db", "TTL cleanup failed: {}", e),
                Err(e) => feed_log!(Level::Warn, "db", "TTL cleanup task aborted: {}", e),
            }
        }
    }))
}

/// Remove rows whose timestamp is older than `ttl_micros` and checkpoint the WAL.
pub fn purge_older_than(db_path: &std::path::Path, ttl_micros: i64) -> rusqlite::Result<usize> {
    let conn = Connection::open(db_path)?;
    let cutoff = chrono::Utc::now().timestamp_micros() - ttl_micros;
    let mut removed = conn.execute("DELETE FROM analysis_results WHERE ts < ?1", [cutoff])?;
    removed += conn.execute(
        "DELETE FROM alerts WHERE updated_at < ?1 AND status IN ('resolved', 'dismissed')",
        [cutoff],
    )?;
    conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
    Ok(removed)
}
