// src/model/outcome.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use super::feed::FeedId;

/// Normalised bounding region, coordinates in `[0, 1]` of the frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub label: String,
    pub confidence: f32,
    pub bbox: BoundingBox,
}

/// Model-specific result body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "lowercase")]
pub enum OutcomePayload {
    Detections(Vec<Detection>),
    /// Named scalar results (motion score, anomaly score, ...).
    Scores(BTreeMap<String, f32>),
    Empty,
}

/// Result of executing one `AnalysisJob`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisOutcome {
    pub feed_id: FeedId,
    pub model: String,
    pub frame_seq: u64,
    pub success: bool,
    pub confidence: f32,
    pub payload: OutcomePayload,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(with = "duration_ms")]
    pub processing_time: Duration,
    pub timestamp: DateTime<Utc>,
}

impl AnalysisOutcome {
    /// Detections whose confidence is strictly above `threshold`.
    pub fn detections_above(&self, threshold: f32) -> impl Iterator<Item = &Detection> {
        let list: &[Detection] = match &self.payload {
            OutcomePayload::Detections(d) => d,
            _ => &[],
        };
        list.iter().filter(move |d| d.confidence > threshold)
    }

    /// `false` when any confidence value is NaN or outside `[0, 1]`, or the
    /// feed id is empty.
    pub fn is_well_formed(&self) -> bool {
        let in_range = |c: f32| (0.0..=1.0).contains(&c);
        if self.feed_id.as_str().is_empty() || !in_range(self.confidence) {
            return false;
        }
        match &self.payload {
            OutcomePayload::Detections(d) => d.iter().all(|d| in_range(d.confidence)),
            OutcomePayload::Scores(s) => s.values().all(|v| v.is_finite()),
            OutcomePayload::Empty => true,
        }
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}
