// src/store/mod.rs

//! The persistence/API collaborator as seen from the core.
//!
//! The core never owns feed, result or alert tables; it talks to whatever
//! implements [`FeedStore`]. Two implementations ship with the crate:
//! - [`MemoryStore`]: in-process records, used by the binary and by tests.
//! - [`ArchivedStore`]: decorator that mirrors outcomes and alerts into the
//!   SQLite archive writers (see [`crate::db`]).

pub mod archive;
pub mod memory;

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

use crate::model::{Alert, AlertId, AlertStatus, AnalysisOutcome, FeedConfig, FeedId, FeedStatus};

pub use archive::{ArchiveSinks, ArchivedStore};
pub use memory::{FeedStats, MemoryStore};

/// Identifier the store assigns to a saved outcome.
pub type OutcomeId = u64;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("feed '{0}' not found")]
    FeedNotFound(FeedId),

    #[error("alert #{0} not found")]
    AlertNotFound(AlertId),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Read/write operations the collaborator exposes to the core.
#[async_trait]
pub trait FeedStore: Send + Sync + 'static {
    async fn load_feed_config(&self, id: &FeedId) -> Result<FeedConfig, StoreError>;

    /// Replace the stored configuration wholesale.
    async fn save_feed_config(&self, config: &FeedConfig) -> Result<(), StoreError>;

    async fn set_feed_status(&self, id: &FeedId, status: FeedStatus) -> Result<(), StoreError>;

    async fn increment_feed_stats(
        &self,
        id: &FeedId,
        frames: u64,
        error_occurred: bool,
    ) -> Result<(), StoreError>;

    async fn save_analysis_outcome(&self, outcome: &AnalysisOutcome) -> Result<OutcomeId, StoreError>;

    /// Insert `alert`, or overwrite the record with the same id.
    async fn create_or_refresh_alert(&self, alert: &Alert) -> Result<Alert, StoreError>;

    async fn transition_alert(
        &self,
        id: AlertId,
        status: AlertStatus,
        actor: &str,
    ) -> Result<(), StoreError>;
}

/// Lets a shared store be decorated or handed out as `Arc<dyn FeedStore>`
/// while the caller keeps its own typed handle.
#[async_trait]
impl<T: FeedStore + ?Sized> FeedStore for Arc<T> {
    async fn load_feed_config(&self, id: &FeedId) -> Result<FeedConfig, StoreError> {
        (**self).load_feed_config(id).await
    }

    async fn save_feed_config(&self, config: &FeedConfig) -> Result<(), StoreError> {
        (**self).save_feed_config(config).await
    }

    async fn set_feed_status(&self, id: &FeedId, status: FeedStatus) -> Result<(), StoreError> {
        (**self).set_feed_status(id, status).await
    }

    async fn increment_feed_stats(
        &self,
        id: &FeedId,
        frames: u64,
        error_occurred: bool,
    ) -> Result<(), StoreError> {
        (**self).increment_feed_stats(id, frames, error_occurred).await
    }

    async fn save_analysis_outcome(&self, outcome: &AnalysisOutcome) -> Result<OutcomeId, StoreError> {
        (**self).save_analysis_outcome(outcome).await
    }

    async fn create_or_refresh_alert(&self, alert: &Alert) -> Result<Alert, StoreError> {
        (**self).create_or_refresh_alert(alert).await
    }

    async fn transition_alert(
        &self,
        id: AlertId,
        status: AlertStatus,
        actor: &str,
    ) -> Result<(), StoreError> {
        (**self).transition_alert(id, status, actor).await
    }
}
