// src/db/db_writer.rs

use log::Level;
use rusqlite::{Connection, ErrorCode};
use std::{thread::sleep, time::{Duration, Instant}};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;

use super::batch_inserts::BatchInsert;
use crate::config::DatabaseConfig;
use crate::feed_log;

const MAX_BUSY_RETRIES: u64 = 5;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sql(#[from] rusqlite::Error),
}

/// Batched archive writer for one record stream.
///
/// SQLite work is synchronous inside the task; the connection is never
/// borrowed across an await point.
pub struct DbWriter<T> {
    conn: Connection,
    rx: mpsc::Receiver<T>,
    flush_every: Duration,
    batch_size: usize,
    buffer: Vec<T>,
    written: u64,
}

impl<T> DbWriter<T>
where
    T: BatchInsert + Send + 'static,
{
    pub fn new(conn: Connection, rx: mpsc::Receiver<T>, cfg: &DatabaseConfig) -> Self {
        let batch_size = cfg.batch_size.max(1);
        Self {
            conn,
            rx,
            flush_every: Duration::from_millis(cfg.flush_interval_ms.max(1)),
            batch_size,
            buffer: Vec::with_capacity(batch_size),
            written: 0,
        }
    }

    /// Consume records until every sender is gone, flushing on size or on
    /// the interval. Returns the number of rows written.
    pub async fn run(mut self) -> u64 {
        let mut ticker = tokio::time::interval(self.flush_every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                rec = self.rx.recv() => {
                    let Some(rec) = rec else { break };
                    self.buffer.push(rec);
                    if self.buffer.len() >= self.batch_size {
                        self.flush();
                    }
                }
                _ = ticker.tick(), if !self.buffer.is_empty() => self.flush(),
            }
        }
        self.flush();
        self.written
    }

    fn flush(&mut self) {
        if self.buffer.is_empty() {
            return;
        }
        let n = self.buffer.len();
        match self.write_batch() {
            Ok(()) => self.written += n as u64,
            Err(e) => feed_log!(Level::Error, "db", "Archive flush failed, {} record(s) dropped: {}", n, e),
        }
        self.buffer.clear();
    }

    /// One transaction per batch; a busy database is retried with linear
    /// backoff before the batch is given up.
    fn write_batch(&mut self) -> Result<(), DbError> {
        let started = Instant::now();
        let mut attempt = 0;
        loop {
            match insert_all(&mut self.conn, &self.buffer) {
                Ok(()) => break,
                Err(rusqlite::Error::SqliteFailure(e, _))
                    if matches!(e.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked)
                        && attempt < MAX_BUSY_RETRIES =>
                {
                    attempt += 1;
                    feed_log!(Level::Debug, "db", "Archive busy, retry {}/{}", attempt, MAX_BUSY_RETRIES);
                    sleep(Duration::from_millis(50 * attempt));
                }
                Err(e) => return Err(e.into()),
            }
        }
        metrics::histogram!("archive_flush_seconds").record(started.elapsed().as_secs_f64());
        metrics::counter!("archive_records_total").increment(self.buffer.len() as u64);
        Ok(())
    }
}

fn insert_all<T: BatchInsert>(conn: &mut Connection, records: &[T]) -> rusqlite::Result<()> {
    let tx = conn.transaction()?;
    for rec in records {
        let mut stmt = tx.prepare_cached(rec.insert_sql())?;
        rec.bind_and_execute(&mut stmt)?;
    }
    tx.commit()
}
