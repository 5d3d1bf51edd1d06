//! Data model shared by workers, the scheduler and the alert engine.
//!
//! Key responsibilities:
//! - Immutable feed configuration with typed model parameters (`feed`).
//! - Analysis jobs and their priority ordering (`job`).
//! - Analysis outcomes and detections (`outcome`).
//! - Alert records and the alert lifecycle (`alert`).

pub mod alert;
pub mod feed;
pub mod job;
pub mod outcome;

pub use alert::{Alert, AlertId, AlertKind, AlertStatus, DedupKey, Severity};
pub use feed::{
    AnomalyParams, Credentials, FaceDetectionParams, FeedConfig, FeedId, FeedStatus,
    LicensePlateParams, ModelConfig, ModelKind, MotionDetectionParams, ObjectDetectionParams,
    Resolution, SourceDescriptor, SourceKind,
};
pub use job::{AnalysisJob, Priority};
pub use outcome::{AnalysisOutcome, BoundingBox, Detection, OutcomePayload};
