// src/db/batch_inserts.rs

use chrono::{DateTime, Utc};
use rusqlite::{params, Result as SqlResult, Statement};

use crate::model::{Alert, AlertId, AlertStatus, AnalysisOutcome};

/// Defines how to write one archived record.
/// Statements are prepared through the connection cache, so records of the
/// same shape share one prepared statement per flush.
pub trait BatchInsert {
    fn insert_sql(&self) -> &'static str;
    fn bind_and_execute(&self, stmt: &mut Statement<'_>) -> SqlResult<()>;
}

/// Alert rows travel through one writer so an upsert and a later status
/// change are applied in the order they happened.
#[derive(Debug, Clone, PartialEq)]
pub enum AlertRecord {
    Upsert(Alert),
    Status(AlertStatusChange),
}

/// A status change recorded against an already archived alert.
#[derive(Debug, Clone, PartialEq)]
pub struct AlertStatusChange {
    pub id: AlertId,
    pub status: AlertStatus,
    pub actor: String,
    pub at: DateTime<Utc>,
}

fn json_or_null<T: serde::Serialize>(v: &T) -> String {
    serde_json::to_string(v).unwrap_or_else(|_| "null".into())
}

/// ANALYSIS OUTCOMES
impl BatchInsert for AnalysisOutcome {
    fn insert_sql(&self) -> &'static str {
        "INSERT INTO analysis_results \
           (ts, feed_id, model, frame_seq, success, confidence, payload, error, processing_ms) \
         VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9)"
    }

    fn bind_and_execute(&self, stmt: &mut Statement<'_>) -> SqlResult<()> {
        let rec = self;
        stmt.execute(params![
            rec.timestamp.timestamp_micros(),
            rec.feed_id.as_str(),
            rec.model,
            rec.frame_seq as i64,
            rec.success,
            rec.confidence as f64,
            json_or_null(&rec.payload),
            rec.error,
            rec.processing_time.as_millis() as i64,
        ])?;
        Ok(())
    }
}

/// ALERTS (upsert: refreshes overwrite the row)
impl BatchInsert for Alert {
    fn insert_sql(&self) -> &'static str {
        "INSERT INTO alerts \
           (id, kind, severity, status, feed_id, title, payload, \
            created_at, updated_at, expires_at, occurrences, last_actor) \
         VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12) \
         ON CONFLICT(id) DO UPDATE SET \
            kind = excluded.kind, severity = excluded.severity, status = excluded.status, \
            payload = excluded.payload, updated_at = excluded.updated_at, \
            expires_at = excluded.expires_at, occurrences = excluded.occurrences, \
            last_actor = excluded.last_actor"
    }

    fn bind_and_execute(&self, stmt: &mut Statement<'_>) -> SqlResult<()> {
        let rec = self;
        stmt.execute(params![
            rec.id.0 as i64,
            rec.kind.as_str(),
            rec.severity.to_string(),
            rec.status.as_str(),
            rec.feed_id.as_ref().map(|f| f.as_str()),
            rec.title,
            rec.payload.to_string(),
            rec.created_at.timestamp_micros(),
            rec.updated_at.timestamp_micros(),
            rec.expires_at.map(|t| t.timestamp_micros()),
            rec.occurrences as i64,
            rec.last_actor,
        ])?;
        Ok(())
    }
}

/// ALERT TRANSITIONS
impl BatchInsert for AlertStatusChange {
    fn insert_sql(&self) -> &'static str {
        "UPDATE alerts SET status = ?1, last_actor = ?2, updated_at = ?3 WHERE id = ?4"
    }

    fn bind_and_execute(&self, stmt: &mut Statement<'_>) -> SqlResult<()> {
        let rec = self;
        stmt.execute(params![
            rec.status.as_str(),
            rec.actor,
            rec.at.timestamp_micros(),
            rec.id.0 as i64,
        ])?;
        Ok(())
    }
}

impl BatchInsert for AlertRecord {
    fn insert_sql(&self) -> &'static str {
        match self {
            AlertRecord::Upsert(a) => a.insert_sql(),
            AlertRecord::Status(c) => c.insert_sql(),
        }
    }

    fn bind_and_execute(&self, stmt: &mut Statement<'_>) -> SqlResult<()> {
        match self {
            AlertRecord::Upsert(a) => a.bind_and_execute(stmt),
            AlertRecord::Status(c) => c.bind_and_execute(stmt),
        }
    }
}
