// src/db/connection.rs
//! Opening and initialising the SQLite archive with runtime parameters.

use std::{fs, path::{Path, PathBuf}, time::Duration};
use log::Level;
use rusqlite::Connection;
use crate::config::DatabaseConfig;
use crate::feed_log;

pub fn db_path(base_dir: &Path, cfg: &DatabaseConfig) -> PathBuf {
    base_dir.join(&cfg.path)
}

pub fn open_db_connection(path: &Path, cfg: &DatabaseConfig) -> rusqlite::Result<Connection> {
    let conn = Connection::open(path)?;
    conn.busy_timeout(Duration::from_millis(1_000))?;
    // journal_mode and journal_size_limit answer with a row.
    let mode: String = conn.pragma_update_and_check(None, "journal_mode", "WAL", |r| r.get(0))?;
    feed_log!(Level::Debug, "db", "Archive journal mode: {}", mode);
    conn.pragma_update(None, "synchronous", cfg.synchronous.as_str())?;
    Ok(conn)
}

/// Open the archive, creating the schema on first use.
pub fn init_database(base_dir: &Path, cfg: &DatabaseConfig) -> rusqlite::Result<Connection> {
    let path = db_path(base_dir, cfg);

    if cfg.purge_on_restart && path.exists() {
        for suffix in ["", "-wal", "-shm"] {
            let mut p = path.clone().into_os_string();
            p.push(suffix);
            let _ = fs::remove_file(p);
        }
    }

    let conn = open_db_connection(&path, cfg)?;
    conn.pragma_update_and_check(None, "journal_size_limit", cfg.journal_size_limit as i64, |r| {
        r.get::<_, i64>(0)
    })?;

    let schema = include_str!("../../resources/schema.sql");
    conn.execute_batch(schema)?;

    feed_log!(Level::Info, "db", "Archive ready at {}", path.display());
    Ok(conn)
}
