// src/scheduler/analyzer.rs

//! The opaque "run a model" operation.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeMap;
use std::hash::Hasher;
use std::time::Duration;
use thiserror::Error;
use twox_hash::XxHash64;

use crate::model::{AnalysisJob, AnalysisOutcome, BoundingBox, Detection, ModelKind, OutcomePayload};

#[derive(Debug, Clone, Error, PartialEq)]
pub enum AnalysisError {
    #[error("model '{0}' unavailable")]
    ModelUnavailable(String),

    #[error("model '{model}' timed out after {after:?}")]
    Timeout { model: String, after: Duration },

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

#[async_trait]
pub trait Analyzer: Send + Sync + 'static {
    async fn analyze(&self, job: &AnalysisJob) -> Result<AnalysisOutcome, AnalysisError>;
}

const DEFAULT_LABELS: [&str; 4] = ["person", "car", "bicycle", "dog"];

/// Deterministic stand-in for real inference. Every result is derived from
/// the XxHash64 of (feed, frame, model), so a given job always yields the
/// same outcome.
#[derive(Debug, Default, Clone)]
pub struct SimulatedAnalyzer {
    /// Fail roughly one job in `n`.
    failure_one_in: Option<u64>,
}

impl SimulatedAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_failures(one_in: u64) -> Self {
        Self { failure_one_in: Some(one_in.max(1)) }
    }

    fn seed(job: &AnalysisJob) -> u64 {
        let mut h = XxHash64::with_seed(0);
        h.write(job.feed_id.as_str().as_bytes());
        h.write_u64(job.frame_seq);
        h.write(job.model_name().as_bytes());
        h.finish()
    }
}

/// Draws uniform values in `[0, 1)` from successive hashes of a seed.
struct Draw(u64);

impl Draw {
    fn next(&mut self) -> f32 {
        let mut h = XxHash64::with_seed(0x5eed);
        h.write_u64(self.0);
        self.0 = h.finish();
        (self.0 >> 40) as f32 / (1u64 << 24) as f32
    }

    fn below(&mut self, n: u32) -> u32 {
        ((self.next() * n as f32) as u32).min(n.saturating_sub(1))
    }

    fn bbox(&mut self) -> BoundingBox {
        let width = 0.05 + self.next() * 0.3;
        let height = 0.05 + self.next() * 0.3;
        BoundingBox {
            x: self.next() * (1.0 - width),
            y: self.next() * (1.0 - height),
            width,
            height,
        }
    }
}

fn detections(draw: &mut Draw, labels: &[&str], count: u32) -> Vec<Detection> {
    (0..count)
        .map(|_| Detection {
            label: labels[draw.below(labels.len() as u32) as usize].to_owned(),
            confidence: draw.next(),
            bbox: draw.bbox(),
        })
        .collect()
}

#[async_trait]
impl Analyzer for SimulatedAnalyzer {
    async fn analyze(&self, job: &AnalysisJob) -> Result<AnalysisOutcome, AnalysisError> {
        let latency = job.model.declared_latency();
        tokio::time::sleep(latency).await;

        let seed = Self::seed(job);
        if self.failure_one_in.is_some_and(|n| seed % n == 0) {
            return Err(AnalysisError::ModelUnavailable(job.model_name().to_owned()));
        }
        let mut draw = Draw(seed);

        let payload = match &job.model {
            ModelKind::ObjectDetection(p) => {
                let labels: Vec<&str> = if p.classes.is_empty() {
                    DEFAULT_LABELS.to_vec()
                } else {
                    p.classes.iter().map(String::as_str).collect()
                };
                let count = draw.below(8).min(p.max_detections);
                OutcomePayload::Detections(detections(&mut draw, &labels, count))
            }
            ModelKind::MotionDetection(p) => {
                let score = draw.next();
                if score >= 1.0 - p.sensitivity {
                    OutcomePayload::Detections(detections(&mut draw, &["motion"], 1))
                } else {
                    OutcomePayload::Scores(BTreeMap::from([("motion".to_owned(), score)]))
                }
            }
            ModelKind::FaceDetection(_) => {
                let count = draw.below(3);
                OutcomePayload::Detections(detections(&mut draw, &["face"], count))
            }
            ModelKind::LicensePlate(p) => {
                let label = format!("plate:{}", p.region);
                let count = draw.below(2);
                OutcomePayload::Detections(detections(&mut draw, &[label.as_str()], count))
            }
            ModelKind::Anomaly(_) => {
                OutcomePayload::Scores(BTreeMap::from([("anomaly".to_owned(), draw.next())]))
            }
        };

        let confidence = match &payload {
            OutcomePayload::Detections(d) => d.iter().map(|d| d.confidence).fold(0.0, f32::max),
            OutcomePayload::Scores(s) => s.values().copied().fold(0.0, f32::max),
            OutcomePayload::Empty => 0.0,
        };

        Ok(AnalysisOutcome {
            feed_id: job.feed_id.clone(),
            model: job.model_name().to_owned(),
            frame_seq: job.frame_seq,
            success: true,
            confidence,
            payload,
            error: None,
            processing_time: latency,
            timestamp: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FeedId, ObjectDetectionParams, Priority};

    fn job(seq: u64, classes: &[&str]) -> AnalysisJob {
        AnalysisJob {
            feed_id: FeedId::from("cam-3"),
            generation: 1,
            model: ModelKind::ObjectDetection(ObjectDetectionParams {
                classes: classes.iter().map(|s| s.to_string()).collect(),
                max_detections: 50,
            }),
            confidence_threshold: 0.5,
            frame_seq: seq,
            submitted_at: Utc::now(),
            priority: Priority::Medium,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn same_job_same_outcome() {
        let a = SimulatedAnalyzer::new().analyze(&job(11, &[])).await.unwrap();
        let b = SimulatedAnalyzer::new().analyze(&job(11, &[])).await.unwrap();
        assert_eq!(a.payload, b.payload);
        assert!(a.is_well_formed());
        assert_eq!(a.processing_time, Duration::from_millis(120));
    }

    #[tokio::test(start_paused = true)]
    async fn labels_come_from_configured_classes() {
        for seq in 0..20 {
            let o = SimulatedAnalyzer::new().analyze(&job(seq, &["forklift"])).await.unwrap();
            assert!(o.detections_above(0.0).all(|d| d.label == "forklift"));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn one_in_one_always_fails() {
        let err = SimulatedAnalyzer::with_failures(1).analyze(&job(1, &[])).await.unwrap_err();
        assert_eq!(err, AnalysisError::ModelUnavailable("object-detection".into()));
    }
}
