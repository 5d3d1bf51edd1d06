// tests/alert_tests.rs

//! Integration tests for the alert engine: dedup, escalation, lifecycle,
//! expiry, and the actor front door.

use chrono::{TimeDelta, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use feedwatch::alerts::{AlertEngine, AlertSignal};
use feedwatch::config::AlertPolicy;
use feedwatch::model::{
    AlertId, AlertKind, AlertStatus, AnalysisOutcome, BoundingBox, Detection, FeedId,
    OutcomePayload, Severity,
};
use feedwatch::store::MemoryStore;
use feedwatch::FeedError;

fn outcome(feed: &str, confidences: &[f32]) -> AnalysisOutcome {
    AnalysisOutcome {
        feed_id: FeedId::from(feed),
        model: "face-detection".into(),
        frame_seq: 10,
        success: true,
        confidence: confidences.iter().copied().fold(0.0, f32::max),
        payload: OutcomePayload::Detections(
            confidences
                .iter()
                .map(|c| Detection {
                    label: "face".into(),
                    confidence: *c,
                    bbox: BoundingBox { x: 0.4, y: 0.2, width: 0.1, height: 0.15 },
                })
                .collect(),
        ),
        error: None,
        processing_time: Duration::from_millis(80),
        timestamp: Utc::now(),
    }
}

fn engine() -> (AlertEngine, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    (AlertEngine::new(store.clone(), AlertPolicy::default()), store)
}

#[tokio::test]
async fn repeated_signal_refreshes_one_alert() {
    let (mut e, store) = engine();
    let t0 = Utc::now();
    let t1 = t0 + TimeDelta::seconds(5);

    let a = e.on_outcome(&outcome("cam-1", &[0.8]), 0.5, t0).await.unwrap();
    let b = e.on_outcome(&outcome("cam-1", &[0.9, 0.7]), 0.5, t1).await.unwrap();
    let c = e.on_outcome(&outcome("cam-2", &[0.9]), 0.5, t1).await.unwrap();

    assert_eq!(a, b);
    assert_ne!(a, c);
    let alert = e.alert(a).unwrap();
    assert_eq!(alert.occurrences, 2);
    assert_eq!(alert.created_at, t0);
    assert_eq!(alert.updated_at, t1);
    assert_eq!(alert.payload["count"], 2);
    assert_eq!(store.alerts().len(), 2);
    assert_eq!(store.alert(a).unwrap().occurrences, 2);
}

#[tokio::test]
async fn failed_outcome_is_a_high_error_alert() {
    let (mut e, _) = engine();
    let mut o = outcome("cam-1", &[]);
    o.success = false;
    o.payload = OutcomePayload::Empty;
    o.error = Some("model 'face-detection' unavailable".into());

    let id = e.on_outcome(&o, 0.5, Utc::now()).await.unwrap();
    let a = e.alert(id).unwrap();
    assert_eq!((a.kind, a.severity), (AlertKind::Error, Severity::High));
    assert_eq!(a.title, "analysis failed: face-detection");
}

#[tokio::test]
async fn unresponsive_escalates_in_place() {
    let (mut e, _) = engine();
    let feed = FeedId::from("cam-7");
    let now = Utc::now();

    let warn = e.on_worker_unresponsive(&feed, Duration::from_secs(6), now).await.unwrap();
    {
        let a = e.alert(warn).unwrap();
        assert_eq!((a.kind, a.severity), (AlertKind::Warning, Severity::Medium));
        assert!(a.expires_at.is_some());
    }

    let crit = e.on_worker_unresponsive(&feed, Duration::from_secs(31), now).await.unwrap();
    assert_eq!(warn, crit);
    let a = e.alert(crit).unwrap();
    assert_eq!((a.kind, a.severity), (AlertKind::Critical, Severity::Critical));
    assert_eq!(a.expires_at, None);
    assert_eq!(e.alerts().len(), 1);
}

#[tokio::test]
async fn critical_alerts_never_expire_medium_after_a_day() {
    let (mut e, store) = engine();
    let t0 = Utc::now();

    let medium = e.on_outcome(&outcome("cam-1", &[0.9]), 0.5, t0).await.unwrap();
    let critical = e
        .on_worker_unresponsive(&FeedId::from("cam-2"), Duration::from_secs(40), t0)
        .await
        .unwrap();
    let acked = e.on_worker_failed(&FeedId::from("cam-3"), "gave up", t0).await.unwrap();
    e.acknowledge(acked, "ops", t0).await.unwrap();

    assert_eq!(e.sweep_expired(t0 + TimeDelta::hours(23)).await, 0);
    assert_eq!(e.sweep_expired(t0 + TimeDelta::hours(24) + TimeDelta::seconds(1)).await, 2);

    assert_eq!(e.alert(medium).unwrap().status, AlertStatus::Dismissed);
    assert_eq!(e.alert(medium).unwrap().last_actor.as_deref(), Some("system"));
    assert_eq!(e.alert(acked).unwrap().status, AlertStatus::Dismissed);
    assert_eq!(e.alert(critical).unwrap().status, AlertStatus::Active);
    assert_eq!(store.alert(medium).unwrap().status, AlertStatus::Dismissed);

    assert_eq!(e.sweep_expired(t0 + TimeDelta::days(365)).await, 0);
}

#[tokio::test]
async fn lifecycle_moves_are_validated() {
    let (mut e, _) = engine();
    let now = Utc::now();
    let id = e.on_outcome(&outcome("cam-1", &[0.9]), 0.5, now).await.unwrap();

    let acked = e.acknowledge(id, "alice", now).await.unwrap();
    assert_eq!(acked.status, AlertStatus::Acknowledged);
    assert_eq!(acked.last_actor.as_deref(), Some("alice"));

    e.resolve(id, "alice", now).await.unwrap();
    let err = e.acknowledge(id, "bob", now).await.unwrap_err();
    assert!(matches!(
        err,
        FeedError::InvalidTransition { from: AlertStatus::Resolved, to: AlertStatus::Acknowledged, .. }
    ));
    assert!(matches!(e.dismiss(id, "bob", now).await, Err(FeedError::InvalidTransition { .. })));

    let unknown = e.resolve(AlertId(999), "bob", now).await.unwrap_err();
    assert!(matches!(unknown, FeedError::AlertNotFound(AlertId(999))));
}

#[tokio::test]
async fn acknowledged_alert_cannot_be_dismissed_by_hand() {
    let (mut e, _) = engine();
    let now = Utc::now();
    let id = e.on_worker_failed(&FeedId::from("cam-2"), "boom", now).await.unwrap();
    e.acknowledge(id, "ops", now).await.unwrap();

    let err = e.dismiss(id, "ops", now).await.unwrap_err();
    assert!(matches!(
        err,
        FeedError::InvalidTransition { from: AlertStatus::Acknowledged, to: AlertStatus::Dismissed, .. }
    ));
    assert_eq!(e.alert(id).unwrap().status, AlertStatus::Acknowledged);

    // Resolution is still open to the operator.
    e.resolve(id, "ops", now).await.unwrap();
}

#[tokio::test]
async fn detection_exactly_at_threshold_raises_nothing() {
    let (mut e, _) = engine();
    let now = Utc::now();
    assert_eq!(e.on_outcome(&outcome("cam-1", &[0.5, 0.5]), 0.5, now).await, None);
    assert!(e.alerts().is_empty());
    assert!(e.on_outcome(&outcome("cam-1", &[0.5, 0.51]), 0.5, now).await.is_some());
}

#[tokio::test]
async fn dismissing_twice_is_fine() {
    let (mut e, _) = engine();
    let now = Utc::now();
    let id = e.on_queue_backlog(120, 100, now).await;

    e.dismiss(id, "ops", now).await.unwrap();
    let again = e.dismiss(id, "someone-else", now).await.unwrap();
    assert_eq!(again.status, AlertStatus::Dismissed);
    assert_eq!(again.last_actor.as_deref(), Some("ops"));
}

#[tokio::test]
async fn signal_after_resolution_opens_a_new_alert() {
    let (mut e, _) = engine();
    let now = Utc::now();
    let first = e.on_outcome(&outcome("cam-1", &[0.9]), 0.5, now).await.unwrap();
    e.resolve(first, "ops", now).await.unwrap();
    let second = e.on_outcome(&outcome("cam-1", &[0.9]), 0.5, now).await.unwrap();
    assert_ne!(first, second);
    assert_eq!(e.active_alerts().len(), 1);
}

#[tokio::test]
async fn malformed_signals_degrade_to_info() {
    let (mut e, _) = engine();
    let now = Utc::now();

    let empty_feed = e.on_outcome(&outcome("", &[0.9]), 0.5, now).await.unwrap();
    let bad_conf = e.on_outcome(&outcome("cam-1", &[1.4]), 0.5, now).await.unwrap();
    let bad_threshold = e.on_outcome(&outcome("cam-1", &[0.9]), f32::NAN, now).await.unwrap();

    assert_eq!(empty_feed, bad_conf);
    assert_eq!(bad_conf, bad_threshold);
    let a = e.alert(empty_feed).unwrap();
    assert_eq!((a.kind, a.severity, a.occurrences), (AlertKind::Info, Severity::Low, 3));
    assert_eq!(a.title, "malformed signal");
}

#[tokio::test]
async fn handle_routes_signals_and_transitions() {
    let store = Arc::new(MemoryStore::new());
    let shutdown = CancellationToken::new();
    let (handle, tasks) = AlertEngine::new(store.clone(), AlertPolicy::default()).spawn(shutdown.clone());

    handle.signal(AlertSignal::Outcome { outcome: outcome("cam-1", &[0.9; 6]), threshold: 0.5 });
    handle.signal(AlertSignal::WorkerFailed { feed_id: FeedId::from("cam-2"), reason: "gone".into() });

    let active = handle.active_alerts().await.unwrap();
    assert_eq!(active.len(), 2);
    let detection = active.iter().find(|a| a.kind == AlertKind::Detection).unwrap();
    assert_eq!(detection.severity, Severity::High);

    handle.acknowledge(detection.id, "carol").await.unwrap();
    assert_eq!(store.alert(detection.id).unwrap().status, AlertStatus::Acknowledged);
    assert_eq!(handle.active_alerts().await.unwrap().len(), 1);
    assert!(matches!(
        handle.acknowledge(AlertId(42), "carol").await,
        Err(FeedError::AlertNotFound(_))
    ));

    shutdown.cancel();
    futures::future::join_all(tasks).await;
    assert!(handle.alerts().await.is_err());
}
