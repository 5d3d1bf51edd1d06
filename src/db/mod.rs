// src/db/mod.rs
//! SQLite archive of outcomes and alerts.
//!
//! One [`DbWriter`] task per record stream; the streams are fed by
//! [`crate::store::ArchivedStore`].

pub mod batch_inserts;
pub mod connection;
pub mod db_writer;
pub mod maintenance;

use log::Level;
use rusqlite::Connection;
use tokio::{sync::mpsc, task::JoinHandle};
use crate::config::DatabaseConfig;
use crate::feed_log;
pub use batch_inserts::{AlertRecord, AlertStatusChange, BatchInsert};
pub use db_writer::{DbError, DbWriter};

/// Spawn the writer for records of type `E`. The task ends after the last
/// sender is dropped and the remaining rows are flushed.
/// Must be called from within a Tokio runtime.
pub fn spawn_writer<E>(
    conn: Connection,
    rx: mpsc::Receiver<E>,
    cfg: &DatabaseConfig,
) -> JoinHandle<()>
where
    E: BatchInsert + Send + 'static,
{
    let writer = DbWriter::new(conn, rx, cfg);
    tokio::spawn(async move {
        let rows = writer.run().await;
        feed_log!(Level::Info, "db", "Archive writer for {} closed after {} row(s)", short_type_name::<E>(), rows);
    })
}

fn short_type_name<E>() -> &'static str {
    let full = std::any::type_name::<E>();
    full.rsplit("::").next().unwrap_or(full)
}
