// src/alerts/engine.rs

//! Alert state: creation, deduplication, escalation, lifecycle moves and
//! expiry. Owned by exactly one task (see [`super::handle`]); nothing here
//! is shared.

use chrono::{DateTime, TimeDelta, Utc};
use log::Level;
use serde_json::json;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use super::AlertSignal;
use crate::config::AlertPolicy;
use crate::error::{FeedError, Result};
use crate::feed_log;
use crate::model::{
    Alert, AlertId, AlertKind, AlertStatus, AnalysisOutcome, DedupKey, FeedId, Severity,
};
use crate::store::FeedStore;

pub const UNRESPONSIVE_TITLE: &str = "worker unresponsive";
pub const WORKER_FAILED_TITLE: &str = "worker failed";
pub const BACKLOG_TITLE: &str = "queue backlog";
pub const MALFORMED_TITLE: &str = "malformed signal";
pub const SYSTEM_ACTOR: &str = "system";

/// Everything needed to create or refresh one alert.
struct Draft {
    kind: AlertKind,
    severity: Severity,
    feed_id: Option<FeedId>,
    title: String,
    payload: serde_json::Value,
}

pub struct AlertEngine {
    store: Arc<dyn FeedStore>,
    policy: Arc<AlertPolicy>,
    alerts: BTreeMap<AlertId, Alert>,
    /// Active alerts by dedup key.
    index: HashMap<DedupKey, AlertId>,
    next_id: u64,
}

impl AlertEngine {
    pub fn new(store: Arc<dyn FeedStore>, policy: AlertPolicy) -> Self {
        Self {
            store,
            policy: Arc::new(policy),
            alerts: BTreeMap::new(),
            index: HashMap::new(),
            next_id: 1,
        }
    }

    pub fn policy(&self) -> &AlertPolicy {
        &self.policy
    }

    pub(crate) fn shared_policy(&self) -> Arc<AlertPolicy> {
        self.policy.clone()
    }

    pub fn alert(&self, id: AlertId) -> Option<&Alert> {
        self.alerts.get(&id)
    }

    pub fn alerts(&self) -> Vec<Alert> {
        self.alerts.values().cloned().collect()
    }

    pub fn active_alerts(&self) -> Vec<Alert> {
        self.alerts
            .values()
            .filter(|a| a.status == AlertStatus::Active)
            .cloned()
            .collect()
    }

    /// Dispatch one signal. Returns the alert that was created or refreshed.
    pub async fn handle(&mut self, signal: AlertSignal, now: DateTime<Utc>) -> Option<AlertId> {
        match signal {
            AlertSignal::Outcome { outcome, threshold } => self.on_outcome(&outcome, threshold, now).await,
            AlertSignal::WorkerUnresponsive { feed_id, stale_for } => {
                self.on_worker_unresponsive(&feed_id, stale_for, now).await
            }
            AlertSignal::WorkerFailed { feed_id, reason } => {
                self.on_worker_failed(&feed_id, &reason, now).await
            }
            AlertSignal::QueueBacklog { size, watermark } => {
                Some(self.on_queue_backlog(size, watermark, now).await)
            }
        }
    }

    pub async fn on_outcome(
        &mut self,
        outcome: &AnalysisOutcome,
        threshold: f32,
        now: DateTime<Utc>,
    ) -> Option<AlertId> {
        if !outcome.is_well_formed() || !(0.0..=1.0).contains(&threshold) {
            let reason = format!(
                "outcome from '{}' frame {} (confidence {}, threshold {})",
                outcome.feed_id, outcome.frame_seq, outcome.confidence, threshold
            );
            return Some(self.malformed(reason, now).await);
        }

        if !outcome.success {
            let draft = Draft {
                kind: AlertKind::Error,
                severity: Severity::High,
                feed_id: Some(outcome.feed_id.clone()),
                title: format!("analysis failed: {}", outcome.model),
                payload: json!({
                    "model": outcome.model,
                    "frame_seq": outcome.frame_seq,
                    "error": outcome.error,
                }),
            };
            return Some(self.raise(draft, now).await);
        }

        let hits: Vec<_> = outcome.detections_above(threshold).collect();
        if hits.is_empty() {
            return None;
        }
        let severity = if hits.len() > self.policy.detection_high_count {
            Severity::High
        } else {
            Severity::Medium
        };
        let draft = Draft {
            kind: AlertKind::Detection,
            severity,
            feed_id: Some(outcome.feed_id.clone()),
            title: format!("{} detections", outcome.model),
            payload: json!({
                "model": outcome.model,
                "frame_seq": outcome.frame_seq,
                "count": hits.len(),
                "detections": hits,
            }),
        };
        Some(self.raise(draft, now).await)
    }

    pub async fn on_worker_unresponsive(
        &mut self,
        feed_id: &FeedId,
        stale_for: Duration,
        now: DateTime<Utc>,
    ) -> Option<AlertId> {
        if feed_id.as_str().is_empty() {
            return Some(self.malformed("unresponsive signal without feed".into(), now).await);
        }
        let escalated = stale_for > self.policy.unresponsive_critical_after;
        let (kind, severity) = if escalated {
            (AlertKind::Critical, Severity::Critical)
        } else {
            (AlertKind::Warning, Severity::Medium)
        };
        let draft = Draft {
            kind,
            severity,
            feed_id: Some(feed_id.clone()),
            title: UNRESPONSIVE_TITLE.into(),
            payload: json!({ "stale_for_secs": stale_for.as_secs_f64() }),
        };
        Some(self.raise(draft, now).await)
    }

    pub async fn on_worker_failed(
        &mut self,
        feed_id: &FeedId,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Option<AlertId> {
        if feed_id.as_str().is_empty() {
            return Some(self.malformed("failure signal without feed".into(), now).await);
        }
        let draft = Draft {
            kind: AlertKind::Error,
            severity: Severity::High,
            feed_id: Some(feed_id.clone()),
            title: WORKER_FAILED_TITLE.into(),
            payload: json!({ "reason": reason }),
        };
        Some(self.raise(draft, now).await)
    }

    /// System-level alert; severity grows with the backlog relative to the
    /// watermark (2x high, 4x critical).
    pub async fn on_queue_backlog(
        &mut self,
        size: usize,
        watermark: usize,
        now: DateTime<Utc>,
    ) -> AlertId {
        let wm = watermark.max(1);
        let severity = if size >= 4 * wm {
            Severity::Critical
        } else if size >= 2 * wm {
            Severity::High
        } else {
            Severity::Medium
        };
        let draft = Draft {
            kind: AlertKind::Warning,
            severity,
            feed_id: None,
            title: BACKLOG_TITLE.into(),
            payload: json!({ "size": size, "watermark": watermark }),
        };
        self.raise(draft, now).await
    }

    async fn malformed(&mut self, reason: String, now: DateTime<Utc>) -> AlertId {
        feed_log!(Level::Warn, "alerts", "Malformed signal: {}", reason);
        let draft = Draft {
            kind: AlertKind::Info,
            severity: Severity::Low,
            feed_id: None,
            title: MALFORMED_TITLE.into(),
            payload: json!({ "reason": reason }),
        };
        self.raise(draft, now).await
    }

    /// Refresh the active alert with the same (feed, title), or create one.
    async fn raise(&mut self, draft: Draft, now: DateTime<Utc>) -> AlertId {
        let key = DedupKey { feed_id: draft.feed_id.clone(), title: draft.title.clone() };

        let refreshed = self
            .index
            .get(&key)
            .and_then(|id| self.alerts.get_mut(id))
            .filter(|a| a.status == AlertStatus::Active);

        let alert = match refreshed {
            Some(existing) => {
                existing.updated_at = now;
                existing.payload = draft.payload;
                existing.occurrences += 1;
                if draft.severity >= existing.severity {
                    existing.severity = draft.severity;
                    existing.kind = draft.kind;
                }
                if existing.severity == Severity::Critical {
                    existing.expires_at = None;
                }
                metrics::counter!("alerts_refreshed_total").increment(1);
                existing.clone()
            }
            None => {
                let id = AlertId(self.next_id);
                self.next_id += 1;
                let expires_at = if draft.severity == Severity::Critical {
                    None
                } else {
                    TimeDelta::from_std(self.policy.default_expiry)
                        .ok()
                        .and_then(|ttl| now.checked_add_signed(ttl))
                };
                let alert = Alert {
                    id,
                    kind: draft.kind,
                    severity: draft.severity,
                    status: AlertStatus::Active,
                    feed_id: draft.feed_id,
                    title: draft.title,
                    payload: draft.payload,
                    created_at: now,
                    updated_at: now,
                    expires_at,
                    occurrences: 1,
                    last_actor: None,
                };
                self.index.insert(key, id);
                self.alerts.insert(id, alert.clone());
                metrics::counter!("alerts_raised_total", "kind" => alert.kind.as_str()).increment(1);
                feed_log!(
                    Level::Info,
                    "alerts",
                    "Alert #{} raised: [{}] {} ({})",
                    id,
                    alert.severity,
                    alert.title,
                    alert.feed_id.as_ref().map_or("system", FeedId::as_str)
                );
                alert
            }
        };

        if let Err(e) = self.store.create_or_refresh_alert(&alert).await {
            feed_log!(Level::Error, "alerts", "Persisting alert #{} failed: {}", alert.id, e);
        }
        alert.id
    }

    /// Validated lifecycle move. Dismissing a dismissed alert succeeds
    /// without touching it.
    pub async fn transition(
        &mut self,
        id: AlertId,
        to: AlertStatus,
        actor: &str,
        now: DateTime<Utc>,
    ) -> Result<Alert> {
        let from = self.alerts.get(&id).ok_or(FeedError::AlertNotFound(id))?.status;
        if from == AlertStatus::Dismissed && to == AlertStatus::Dismissed {
            return self.alerts.get(&id).cloned().ok_or(FeedError::AlertNotFound(id));
        }
        if !from.can_transition_to(to) {
            return Err(FeedError::InvalidTransition { id, from, to });
        }
        self.apply_transition(id, from, to, actor, now).await
    }

    /// Persist and apply a move that has already been validated.
    async fn apply_transition(
        &mut self,
        id: AlertId,
        from: AlertStatus,
        to: AlertStatus,
        actor: &str,
        now: DateTime<Utc>,
    ) -> Result<Alert> {
        self.store.transition_alert(id, to, actor).await?;

        let alert = self.alerts.get_mut(&id).ok_or(FeedError::AlertNotFound(id))?;
        alert.status = to;
        alert.updated_at = now;
        alert.last_actor = Some(actor.to_owned());
        let alert = alert.clone();

        // Only active alerts absorb new signals.
        let key = alert.dedup_key();
        if self.index.get(&key) == Some(&id) {
            self.index.remove(&key);
        }
        feed_log!(Level::Info, "alerts", "Alert #{} {} -> {} by {}", id, from, to, actor);
        Ok(alert)
    }

    pub async fn acknowledge(&mut self, id: AlertId, actor: &str, now: DateTime<Utc>) -> Result<Alert> {
        self.transition(id, AlertStatus::Acknowledged, actor, now).await
    }

    pub async fn resolve(&mut self, id: AlertId, actor: &str, now: DateTime<Utc>) -> Result<Alert> {
        self.transition(id, AlertStatus::Resolved, actor, now).await
    }

    pub async fn dismiss(&mut self, id: AlertId, actor: &str, now: DateTime<Utc>) -> Result<Alert> {
        self.transition(id, AlertStatus::Dismissed, actor, now).await
    }

    /// Dismiss every active or acknowledged alert whose expiry has passed.
    pub async fn sweep_expired(&mut self, now: DateTime<Utc>) -> usize {
        let due: Vec<(AlertId, AlertStatus)> = self
            .alerts
            .values()
            .filter(|a| !a.status.is_terminal() && a.is_expired(now))
            .map(|a| (a.id, a.status))
            .collect();

        let mut dismissed = 0;
        for (id, from) in due {
            match self.apply_transition(id, from, AlertStatus::Dismissed, SYSTEM_ACTOR, now).await {
                Ok(_) => dismissed += 1,
                Err(e) => feed_log!(Level::Warn, "alerts", "Expiring alert #{} failed: {}", id, e),
            }
        }
        dismissed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BoundingBox, Detection, OutcomePayload};
    use crate::store::MemoryStore;

    fn engine() -> (AlertEngine, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (AlertEngine::new(store.clone(), AlertPolicy::default()), store)
    }

    fn detections(feed: &str, confidences: &[f32]) -> AnalysisOutcome {
        AnalysisOutcome {
            feed_id: FeedId::from(feed),
            model: "object-detection".into(),
            frame_seq: 3,
            success: true,
            confidence: confidences.iter().copied().fold(0.0, f32::max),
            payload: OutcomePayload::Detections(
                confidences
                    .iter()
                    .map(|c| Detection {
                        label: "person".into(),
                        confidence: *c,
                        bbox: BoundingBox { x: 0.0, y: 0.0, width: 0.1, height: 0.1 },
                    })
                    .collect(),
            ),
            error: None,
            processing_time: Duration::from_millis(120),
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn more_than_five_detections_is_high() {
        let (mut e, store) = engine();
        let now = Utc::now();
        let id = e.on_outcome(&detections("cam-1", &[0.9; 6]), 0.5, now).await.unwrap();
        assert_eq!(e.alert(id).unwrap().severity, Severity::High);
        assert_eq!(store.alert(id).unwrap().title, "object-detection detections");

        let (mut e, _) = engine();
        let id = e.on_outcome(&detections("cam-1", &[0.9; 5]), 0.5, now).await.unwrap();
        assert_eq!(e.alert(id).unwrap().severity, Severity::Medium);
    }

    #[tokio::test]
    async fn below_threshold_raises_nothing() {
        let (mut e, _) = engine();
        assert!(e.on_outcome(&detections("cam-1", &[0.2, 0.49]), 0.5, Utc::now()).await.is_none());
        assert!(e.alerts().is_empty());
    }

    #[tokio::test]
    async fn severity_never_drops_while_active() {
        let (mut e, _) = engine();
        let now = Utc::now();
        let first = e.on_outcome(&detections("cam-1", &[0.9; 7]), 0.5, now).await.unwrap();
        let second = e.on_outcome(&detections("cam-1", &[0.9]), 0.5, now).await.unwrap();
        assert_eq!(first, second);
        let a = e.alert(first).unwrap();
        assert_eq!(a.severity, Severity::High);
        assert_eq!(a.occurrences, 2);
    }

    #[tokio::test]
    async fn nan_confidence_degrades_to_info() {
        let (mut e, _) = engine();
        let mut o = detections("cam-1", &[0.9]);
        o.confidence = f32::NAN;
        let id = e.on_outcome(&o, 0.5, Utc::now()).await.unwrap();
        let a = e.alert(id).unwrap();
        assert_eq!((a.kind, a.severity, a.feed_id.clone()), (AlertKind::Info, Severity::Low, None));
        assert_eq!(a.title, MALFORMED_TITLE);
    }

    #[tokio::test]
    async fn backlog_severity_scales_with_size() {
        let (mut e, _) = engine();
        let now = Utc::now();
        let id = e.on_queue_backlog(150, 100, now).await;
        assert_eq!(e.alert(id).unwrap().severity, Severity::Medium);
        e.on_queue_backlog(450, 100, now).await;
        let a = e.alert(id).unwrap();
        assert_eq!(a.severity, Severity::Critical);
        assert_eq!(a.expires_at, None);
        assert_eq!(a.feed_id, None);
    }

    #[tokio::test]
    async fn acknowledged_alert_no_longer_absorbs_signals() {
        let (mut e, _) = engine();
        let now = Utc::now();
        let first = e.on_worker_failed(&FeedId::from("cam-2"), "boom", now).await.unwrap();
        e.acknowledge(first, "ops", now).await.unwrap();
        let second = e.on_worker_failed(&FeedId::from("cam-2"), "boom again", now).await.unwrap();
        assert_ne!(first, second);
    }
}
