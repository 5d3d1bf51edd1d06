// src/error.rs

//! Error taxonomy shared by the supervisor, scheduler and alert engine.
//!
//! Every exposed operation returns `Result<_, FeedError>`; idempotent stops
//! are reported as a success value (`StopStatus::AlreadyStopped`), never as an
//! error.

use thiserror::Error;

use crate::model::{AlertId, AlertStatus, FeedId};
use crate::store::StoreError;
use crate::worker::CaptureError;
use crate::scheduler::AnalysisError;

pub type Result<T, E = FeedError> = std::result::Result<T, E>;

/// All the ways a supervisor/scheduler/alert operation can fail.
#[derive(Debug, Error)]
pub enum FeedError {
    /// Invalid feed settings; fatal to starting a worker.
    #[error("invalid configuration for feed '{feed_id}': {reason}")]
    Config { feed_id: FeedId, reason: String },

    #[error("feed '{0}' not found")]
    FeedNotFound(FeedId),

    #[error("alert #{0} not found")]
    AlertNotFound(AlertId),

    #[error("feed '{0}' is already active")]
    AlreadyActive(FeedId),

    /// The job belongs to a generation of the feed that has been stopped.
    #[error("feed '{feed_id}' generation {generation} is stopped")]
    FeedStopped { feed_id: FeedId, generation: u64 },

    /// Back-pressure signal; the caller may retry later.
    #[error("job queue full (capacity {capacity})")]
    QueueFull { capacity: usize },

    #[error("alert #{id}: cannot move from {from} to {to}")]
    InvalidTransition {
        id: AlertId,
        from: AlertStatus,
        to: AlertStatus,
    },

    #[error("capture failed: {0}")]
    Capture(#[from] CaptureError),

    #[error("analysis failed: {0}")]
    Analysis(#[from] AnalysisError),

    #[error("store error: {0}")]
    Store(#[source] StoreError),
}

impl FeedError {
    /// `true` for errors a caller can retry without changing its request.
    pub fn is_retryable(&self) -> bool {
        matches!(self, FeedError::QueueFull { .. })
    }

    /// `true` for the two "unknown id" errors.
    pub fn is_not_found(&self) -> bool {
        matches!(self, FeedError::FeedNotFound(_) | FeedError::AlertNotFound(_))
    }
}

impl From<StoreError> for FeedError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::FeedNotFound(id) => FeedError::FeedNotFound(id),
            StoreError::AlertNotFound(id) => FeedError::AlertNotFound(id),
            other => FeedError::Store(other),
        }
    }
}
