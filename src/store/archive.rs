// src/store/archive.rs

//! `FeedStore` decorator that mirrors outcomes and alerts into the archive.
//!
//! The inner store stays authoritative. Archive channels are bounded and fed
//! with `try_send`, so a slow disk drops archive rows instead of stalling the
//! scheduler or the alert engine.

use async_trait::async_trait;
use chrono::Utc;
use log::Level;
use tokio::sync::mpsc;

use super::{FeedStore, OutcomeId, StoreError};
use crate::db::{AlertRecord, AlertStatusChange};
use crate::feed_log;
use crate::model::{Alert, AlertId, AlertStatus, AnalysisOutcome, FeedConfig, FeedId, FeedStatus};

/// Send ends of the archive writers.
#[derive(Clone)]
pub struct ArchiveSinks {
    pub outcomes: mpsc::Sender<AnalysisOutcome>,
    pub alerts: mpsc::Sender<AlertRecord>,
}

pub struct ArchivedStore<S> {
    inner: S,
    sinks: ArchiveSinks,
}

impl<S: FeedStore> ArchivedStore<S> {
    pub fn new(inner: S, sinks: ArchiveSinks) -> Self {
        Self { inner, sinks }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }
}

fn offer<T>(tx: &mpsc::Sender<T>, rec: T, what: &str) {
    if tx.try_send(rec).is_err() {
        metrics::counter!("archive_dropped_total", "record" => what.to_owned()).increment(1);
        feed_log!(Level::Debug, "store", "Archive queue full or closed, {} row dropped", what);
    }
}

#[async_trait]
impl<S: FeedStore> FeedStore for ArchivedStore<S> {
    async fn load_feed_config(&self, id: &FeedId) -> Result<FeedConfig, StoreError> {
        self.inner.load_feed_config(id).await
    }

    async fn save_feed_config(&self, config: &FeedConfig) -> Result<(), StoreError> {
        self.inner.save_feed_config(config).await
    }

    async fn set_feed_status(&self, id: &FeedId, status: FeedStatus) -> Result<(), StoreError> {
        self.inner.set_feed_status(id, status).await
    }

    async fn increment_feed_stats(
        &self,
        id: &FeedId,
        frames: u64,
        error_occurred: bool,
    ) -> Result<(), StoreError> {
        self.inner.increment_feed_stats(id, frames, error_occurred).await
    }

    async fn save_analysis_outcome(&self, outcome: &AnalysisOutcome) -> Result<OutcomeId, StoreError> {
        let id = self.inner.save_analysis_outcome(outcome).await?;
        offer(&self.sinks.outcomes, outcome.clone(), "outcome");
        Ok(id)
    }

    async fn create_or_refresh_alert(&self, alert: &Alert) -> Result<Alert, StoreError> {
        let stored = self.inner.create_or_refresh_alert(alert).await?;
        offer(&self.sinks.alerts, AlertRecord::Upsert(stored.clone()), "alert");
        Ok(stored)
    }

    async fn transition_alert(
        &self,
        id: AlertId,
        status: AlertStatus,
        actor: &str,
    ) -> Result<(), StoreError> {
        self.inner.transition_alert(id, status, actor).await?;
        offer(
            &self.sinks.alerts,
            AlertRecord::Status(AlertStatusChange { id, status, actor: actor.to_owned(), at: Utc::now() }),
            "transition",
        );
        Ok(())
    }
}
