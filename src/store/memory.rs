// src/store/memory.rs

//! In-process `FeedStore`.
//!
//! Plain maps behind a `std::sync::Mutex`; no call holds the lock across an
//! await point.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use super::{FeedStore, OutcomeId, StoreError};
use crate::model::{Alert, AlertId, AlertStatus, AnalysisOutcome, FeedConfig, FeedId, FeedStatus};

/// Per-feed counters maintained by `increment_feed_stats`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeedStats {
    pub frames_processed: u64,
    pub errors: u64,
}

#[derive(Default)]
struct Records {
    feeds: HashMap<FeedId, FeedConfig>,
    status: HashMap<FeedId, FeedStatus>,
    stats: HashMap<FeedId, FeedStats>,
    outcomes: Vec<AnalysisOutcome>,
    alerts: BTreeMap<AlertId, Alert>,
}

#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<Records>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store pre-populated with `feeds` (all `inactive`).
    pub fn with_feeds(feeds: impl IntoIterator<Item = FeedConfig>) -> Self {
        let store = Self::new();
        {
            let mut r = store.lock();
            for f in feeds {
                r.status.insert(f.id.clone(), FeedStatus::Inactive);
                r.feeds.insert(f.id.clone(), f);
            }
        }
        store
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Records> {
        // A panic while holding the lock cannot leave the maps half-written.
        self.records.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn feed_ids(&self) -> Vec<FeedId> {
        let mut ids: Vec<_> = self.lock().feeds.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn feed_status(&self, id: &FeedId) -> Option<FeedStatus> {
        self.lock().status.get(id).copied()
    }

    pub fn feed_stats(&self, id: &FeedId) -> FeedStats {
        self.lock().stats.get(id).copied().unwrap_or_default()
    }

    pub fn outcomes(&self) -> Vec<AnalysisOutcome> {
        self.lock().outcomes.clone()
    }

    pub fn alerts(&self) -> Vec<Alert> {
        self.lock().alerts.values().cloned().collect()
    }

    pub fn alert(&self, id: AlertId) -> Option<Alert> {
        self.lock().alerts.get(&id).cloned()
    }
}

#[async_trait]
impl FeedStore for MemoryStore {
    async fn load_feed_config(&self, id: &FeedId) -> Result<FeedConfig, StoreError> {
        self.lock()
            .feeds
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::FeedNotFound(id.clone()))
    }

    async fn save_feed_config(&self, config: &FeedConfig) -> Result<(), StoreError> {
        let mut r = self.lock();
        r.status.entry(config.id.clone()).or_insert(FeedStatus::Inactive);
        r.feeds.insert(config.id.clone(), config.clone());
        Ok(())
    }

    async fn set_feed_status(&self, id: &FeedId, status: FeedStatus) -> Result<(), StoreError> {
        let mut r = self.lock();
        if !r.feeds.contains_key(id) {
            return Err(StoreError::FeedNotFound(id.clone()));
        }
        r.status.insert(id.clone(), status);
        Ok(())
    }

    async fn increment_feed_stats(
        &self,
        id: &FeedId,
        frames: u64,
        error_occurred: bool,
    ) -> Result<(), StoreError> {
        let mut r = self.lock();
        let stats = r.stats.entry(id.clone()).or_default();
        stats.frames_processed += frames;
        if error_occurred {
            stats.errors += 1;
        }
        Ok(())
    }

    async fn save_analysis_outcome(&self, outcome: &AnalysisOutcome) -> Result<OutcomeId, StoreError> {
        let mut r = self.lock();
        r.outcomes.push(outcome.clone());
        Ok(r.outcomes.len() as OutcomeId)
    }

    async fn create_or_refresh_alert(&self, alert: &Alert) -> Result<Alert, StoreError> {
        self.lock().alerts.insert(alert.id, alert.clone());
        Ok(alert.clone())
    }

    async fn transition_alert(
        &self,
        id: AlertId,
        status: AlertStatus,
        actor: &str,
    ) -> Result<(), StoreError> {
        let mut r = self.lock();
        let alert = r.alerts.get_mut(&id).ok_or(StoreError::AlertNotFound(id))?;
        alert.status = status;
        alert.last_actor = Some(actor.to_owned());
        alert.updated_at = chrono::Utc::now();
        Ok(())
    }
}
