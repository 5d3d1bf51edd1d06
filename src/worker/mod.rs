//! Per-feed capture workers.
//!
//! Key responsibilities:
//! - Acquire frames at the feed's target rate through a [`FrameSource`].
//! - Report every frame (the heartbeat) and one job per active model to the
//!   supervisor over a single event channel.
//! - Absorb transient capture failures and give up after a configurable
//!   number of consecutive ones.

pub mod handle;
pub mod source;

use tokio::time::Instant;

use crate::model::{AnalysisJob, FeedId};

pub use handle::{CaptureLoop, TickOutcome, WorkerHandle, WorkerPhase};
pub use source::{CaptureError, Frame, FrameSource, SimulatedSource};

/// Everything a worker tells its supervisor. Each event carries the
/// generation of the worker that produced it so stale events can be dropped.
#[derive(Debug, Clone)]
pub enum WorkerEvent {
    FrameCaptured {
        feed_id: FeedId,
        generation: u64,
        seq: u64,
        at: Instant,
    },
    JobReady(AnalysisJob),
    CaptureFailed {
        feed_id: FeedId,
        generation: u64,
        consecutive: u32,
        error: CaptureError,
    },
    WorkerFailed {
        feed_id: FeedId,
        generation: u64,
        reason: String,
    },
}

impl WorkerEvent {
    pub fn feed_id(&self) -> &FeedId {
        match self {
            WorkerEvent::FrameCaptured { feed_id, .. }
            | WorkerEvent::CaptureFailed { feed_id, .. }
            | WorkerEvent::WorkerFailed { feed_id, .. } => feed_id,
            WorkerEvent::JobReady(job) => &job.feed_id,
        }
    }

    pub fn generation(&self) -> u64 {
        match self {
            WorkerEvent::FrameCaptured { generation, .. }
            | WorkerEvent::CaptureFailed { generation, .. }
            | WorkerEvent::WorkerFailed { generation, .. } => *generation,
            WorkerEvent::JobReady(job) => job.generation,
        }
    }
}
