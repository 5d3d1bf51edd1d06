// src/model/job.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::feed::{FeedId, ModelKind};

/// Scheduling priority; `Ord` follows `Low < Medium < High < Critical`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
            Priority::Critical => "critical",
        })
    }
}

/// A request for one model to process one captured frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisJob {
    pub feed_id: FeedId,
    /// Worker incarnation that produced the job; bumps on every (re)start.
    pub generation: u64,
    pub model: ModelKind,
    pub confidence_threshold: f32,
    pub frame_seq: u64,
    pub submitted_at: DateTime<Utc>,
    pub priority: Priority,
}

impl AnalysisJob {
    pub fn model_name(&self) -> &'static str {
        self.model.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_order_is_critical_high_medium_low() {
        let mut v = vec![Priority::Medium, Priority::Critical, Priority::Low, Priority::High];
        v.sort();
        assert_eq!(v, vec![Priority::Low, Priority::Medium, Priority::High, Priority::Critical]);
        assert_eq!(Priority::default(), Priority::Medium);
    }
}
