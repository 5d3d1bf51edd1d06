// src/worker/source.rs

//! Frame acquisition behind the [`FrameSource`] seam.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::hash::Hasher;
use std::time::Duration;
use thiserror::Error;
use twox_hash::XxHash64;

use crate::model::{Resolution, SourceDescriptor, SourceKind};

#[derive(Debug, Clone, Error, PartialEq)]
pub enum CaptureError {
    #[error("source '{address}' unreachable")]
    Unreachable { address: String },

    #[error("no frame within {0:?}")]
    Timeout(Duration),

    #[error("frame could not be decoded: {0}")]
    Decode(String),
}

/// One acquired frame. Pixel data never leaves the source; the digest
/// stands in for it.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub seq: u64,
    pub captured_at: DateTime<Utc>,
    pub resolution: Resolution,
    pub digest: u64,
}

/// Opaque "grab one frame" operation, keyed by the descriptor's kind.
#[async_trait]
pub trait FrameSource: Send + Sync + 'static {
    async fn capture(
        &self,
        source: &SourceDescriptor,
        resolution: Resolution,
        seq: u64,
    ) -> Result<Frame, CaptureError>;
}

/// Source that sleeps for the kind's nominal latency and returns a
/// synthetic frame.
#[derive(Debug, Default, Clone, Copy)]
pub struct SimulatedSource;

impl SimulatedSource {
    pub fn declared_latency(kind: SourceKind) -> Duration {
        match kind {
            SourceKind::Rtsp => Duration::from_millis(20),
            SourceKind::Http => Duration::from_millis(50),
            SourceKind::File => Duration::from_millis(5),
            SourceKind::Device => Duration::from_millis(10),
        }
    }
}

#[async_trait]
impl FrameSource for SimulatedSource {
    async fn capture(
        &self,
        source: &SourceDescriptor,
        resolution: Resolution,
        seq: u64,
    ) -> Result<Frame, CaptureError> {
        if source.address.is_empty() {
            return Err(CaptureError::Unreachable { address: String::new() });
        }
        tokio::time::sleep(Self::declared_latency(source.kind)).await;

        let mut h = XxHash64::with_seed(seq);
        h.write(source.kind.as_str().as_bytes());
        h.write(source.address.as_bytes());
        h.write_u32(resolution.width);
        h.write_u32(resolution.height);

        Ok(Frame { seq, captured_at: Utc::now(), resolution, digest: h.finish() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rtsp(address: &str) -> SourceDescriptor {
        SourceDescriptor { kind: SourceKind::Rtsp, address: address.into(), credentials: None }
    }

    #[tokio::test(start_paused = true)]
    async fn simulated_frames_are_deterministic_per_seq() {
        let src = SimulatedSource;
        let a = src.capture(&rtsp("rtsp://cam"), Resolution::default(), 4).await.unwrap();
        let b = src.capture(&rtsp("rtsp://cam"), Resolution::default(), 4).await.unwrap();
        let c = src.capture(&rtsp("rtsp://cam"), Resolution::default(), 5).await.unwrap();
        assert_eq!(a.digest, b.digest);
        assert_ne!(a.digest, c.digest);
    }

    #[tokio::test]
    async fn empty_address_is_unreachable() {
        let err = SimulatedSource.capture(&rtsp(""), Resolution::default(), 1).await.unwrap_err();
        assert!(matches!(err, CaptureError::Unreachable { .. }));
    }
}
