// src/model/feed.rs

//! Feed configuration as registered with the collaborator.
//!
//! A `FeedConfig` is immutable once built: the supervisor holds it behind an
//! `Arc` and an update replaces the whole value.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use super::job::Priority;

/// Identifier of a registered feed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeedId(String);

impl FeedId {
    pub fn new(id: impl Into<String>) -> Self {
        FeedId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FeedId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FeedId {
    fn from(s: &str) -> Self {
        FeedId(s.to_owned())
    }
}

impl From<String> for FeedId {
    fn from(s: String) -> Self {
        FeedId(s)
    }
}

/// Status of a feed as recorded by the external collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedStatus {
    Active,
    Inactive,
    Error,
}

/// How frames are acquired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Network stream (RTSP and friends).
    Rtsp,
    /// Snapshot endpoint polled over HTTP.
    Http,
    /// Local video file.
    File,
    /// Attached capture device.
    Device,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Rtsp => "rtsp",
            SourceKind::Http => "http",
            SourceKind::File => "file",
            SourceKind::Device => "device",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// Where a feed's frames come from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDescriptor {
    pub kind: SourceKind,
    pub address: String,
    #[serde(default)]
    pub credentials: Option<Credentials>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Default for Resolution {
    fn default() -> Self {
        Resolution { width: 1280, height: 720 }
    }
}

/// Recognised analysis models, each with its own parameter set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "params", rename_all = "kebab-case")]
pub enum ModelKind {
    ObjectDetection(ObjectDetectionParams),
    MotionDetection(MotionDetectionParams),
    FaceDetection(FaceDetectionParams),
    LicensePlate(LicensePlateParams),
    Anomaly(AnomalyParams),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectDetectionParams {
    /// Labels to report; empty means every label the model knows.
    #[serde(default)]
    pub classes: Vec<String>,
    #[serde(default = "default_max_detections")]
    pub max_detections: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MotionDetectionParams {
    /// 0.0 (insensitive) ..= 1.0 (every pixel change counts).
    #[serde(default = "default_sensitivity")]
    pub sensitivity: f32,
    /// Minimum changed area in pixels before a region is reported.
    #[serde(default)]
    pub min_area: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceDetectionParams {
    #[serde(default)]
    pub min_face_size: u32,
    #[serde(default)]
    pub landmarks: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LicensePlateParams {
    /// Plate format region, e.g. "eu" or "us".
    pub region: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyParams {
    /// Number of frames in the rolling baseline.
    #[serde(default = "default_window")]
    pub window: u32,
}

fn default_max_detections() -> u32 { 50 }
fn default_sensitivity() -> f32 { 0.5 }
fn default_window() -> u32 { 30 }

impl ModelKind {
    /// Stable name used in job routing, alert titles and the archive.
    pub fn name(&self) -> &'static str {
        match self {
            ModelKind::ObjectDetection(_) => "object-detection",
            ModelKind::MotionDetection(_) => "motion-detection",
            ModelKind::FaceDetection(_) => "face-detection",
            ModelKind::LicensePlate(_) => "license-plate",
            ModelKind::Anomaly(_) => "anomaly",
        }
    }

    /// Nominal time one inference takes.
    pub fn declared_latency(&self) -> Duration {
        match self {
            ModelKind::ObjectDetection(_) => Duration::from_millis(120),
            ModelKind::MotionDetection(_) => Duration::from_millis(15),
            ModelKind::FaceDetection(_) => Duration::from_millis(80),
            ModelKind::LicensePlate(_) => Duration::from_millis(60),
            ModelKind::Anomaly(_) => Duration::from_millis(40),
        }
    }
}

/// One model enabled on a feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default = "default_threshold")]
    pub confidence_threshold: f32,
    #[serde(flatten)]
    pub kind: ModelKind,
}

fn default_true() -> bool { true }
fn default_threshold() -> f32 { 0.5 }

/// Immutable per-feed configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedConfig {
    pub id: FeedId,
    #[serde(default)]
    pub name: String,
    pub source: SourceDescriptor,
    pub fps: f64,
    #[serde(default)]
    pub resolution: Resolution,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub models: Vec<ModelConfig>,
}

impl FeedConfig {
    /// Check the settings a worker needs before it can run.
    pub fn validate(&self) -> Result<(), String> {
        if !self.fps.is_finite() || self.fps <= 0.0 {
            return Err(format!("fps must be positive, got {}", self.fps));
        }
        if self.resolution.width == 0 || self.resolution.height == 0 {
            return Err(format!(
                "resolution must be positive, got {}x{}",
                self.resolution.width, self.resolution.height
            ));
        }
        for m in &self.models {
            if !(0.0..=1.0).contains(&m.confidence_threshold) {
                return Err(format!(
                    "{}: confidence_threshold {} outside [0, 1]",
                    m.kind.name(),
                    m.confidence_threshold
                ));
            }
        }
        Ok(())
    }

    /// Tick period derived from the target frame rate (`1000 / fps` ms).
    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.fps)
    }

    pub fn active_models(&self) -> impl Iterator<Item = &ModelConfig> {
        self.models.iter().filter(|m| m.active)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(fps: f64) -> FeedConfig {
        FeedConfig {
            id: FeedId::from("cam-1"),
            name: "lobby".into(),
            source: SourceDescriptor {
                kind: SourceKind::Rtsp,
                address: "rtsp://10.0.0.5/stream1".into(),
                credentials: None,
            },
            fps,
            resolution: Resolution::default(),
            priority: Priority::Medium,
            enabled: true,
            models: vec![],
        }
    }

    #[test]
    fn rejects_non_positive_fps() {
        assert!(feed(0.0).validate().is_err());
        assert!(feed(-3.0).validate().is_err());
        assert!(feed(f64::NAN).validate().is_err());
        assert!(feed(0.5).validate().is_ok());
    }

    #[test]
    fn rejects_zero_resolution() {
        let mut f = feed(10.0);
        f.resolution.height = 0;
        assert!(f.validate().unwrap_err().contains("resolution"));
    }

    #[test]
    fn frame_interval_is_one_over_fps() {
        assert_eq!(feed(10.0).frame_interval(), Duration::from_millis(100));
        assert_eq!(feed(0.5).frame_interval(), Duration::from_secs(2));
    }

    #[test]
    fn model_params_deserialize_as_tagged_union() {
        let toml_src = r#"
            type = "object-detection"
            confidence_threshold = 0.6
            [params]
            classes = ["person", "car"]
        "#;
        let m: ModelConfig = toml::from_str(toml_src).unwrap();
        assert!(m.active);
        assert_eq!(m.confidence_threshold, 0.6);
        match m.kind {
            ModelKind::ObjectDetection(p) => {
                assert_eq!(p.classes, vec!["person", "car"]);
                assert_eq!(p.max_detections, 50);
            }
            other => panic!("unexpected kind {:?}", other),
        }
    }

    #[test]
    fn unknown_model_type_is_rejected() {
        let toml_src = r#"
            type = "emotion"
            [params]
        "#;
        assert!(toml::from_str::<ModelConfig>(toml_src).is_err());
    }
}
