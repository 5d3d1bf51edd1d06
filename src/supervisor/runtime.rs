// src/supervisor/runtime.rs

use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerStatus {
    /// Registered, no frame yet.
    Starting,
    Active,
    /// Gave up after too many capture failures; kept until stopped.
    Error,
    Stopped,
}

/// Supervisor-side bookkeeping for one running feed.
#[derive(Debug, Clone)]
pub struct WorkerRuntimeState {
    pub status: WorkerStatus,
    pub generation: u64,
    pub started_at: DateTime<Utc>,
    pub started: Instant,
    pub frames_captured: u64,
    pub last_frame_seq: u64,
    pub first_heartbeat: Option<Instant>,
    pub last_heartbeat: Option<Instant>,
    pub consecutive_errors: u32,
    pub total_errors: u64,
}

impl WorkerRuntimeState {
    pub fn new(generation: u64, started: Instant) -> Self {
        Self {
            status: WorkerStatus::Starting,
            generation,
            started_at: Utc::now(),
            started,
            frames_captured: 0,
            last_frame_seq: 0,
            first_heartbeat: None,
            last_heartbeat: None,
            consecutive_errors: 0,
            total_errors: 0,
        }
    }

    pub fn record_heartbeat(&mut self, seq: u64, at: Instant) {
        self.frames_captured += 1;
        self.last_frame_seq = seq;
        self.consecutive_errors = 0;
        self.first_heartbeat.get_or_insert(at);
        self.last_heartbeat = Some(at);
        if self.status == WorkerStatus::Starting {
            self.status = WorkerStatus::Active;
        }
    }

    pub fn record_failure(&mut self, consecutive: u32) {
        self.consecutive_errors = consecutive;
        self.total_errors += 1;
    }

    /// Last sign of life: the latest heartbeat, or the start if none yet.
    pub fn last_seen(&self) -> Instant {
        self.last_heartbeat.unwrap_or(self.started)
    }

    pub fn stale_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_seen())
    }
}
