//! Alert escalation.
//!
//! Key responsibilities:
//! - Turn analysis outcomes and worker/queue health signals into alerts.
//! - Deduplicate on (feed, title) while an alert is active, never lowering
//!   its severity.
//! - Enforce the alert lifecycle and expire stale non-critical alerts.
//! - Run as one task behind a cloneable [`AlertHandle`].

pub mod engine;
pub mod handle;

use std::time::Duration;

use crate::model::{AnalysisOutcome, FeedId};

pub use engine::AlertEngine;
pub use handle::AlertHandle;

/// Inputs the engine reacts to.
#[derive(Debug, Clone)]
pub enum AlertSignal {
    Outcome { outcome: AnalysisOutcome, threshold: f32 },
    WorkerUnresponsive { feed_id: FeedId, stale_for: Duration },
    WorkerFailed { feed_id: FeedId, reason: String },
    QueueBacklog { size: usize, watermark: usize },
}
