// src/alerts/handle.rs

//! The alert engine as a single-owner task.
//!
//! Signals are fire-and-forget (`try_send`): a full mailbox drops the
//! signal and counts it, so a burst of outcomes never stalls the scheduler.
//! Transitions and queries wait for a reply over a oneshot channel.

use chrono::{DateTime, Utc};
use log::Level;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::engine::AlertEngine;
use super::AlertSignal;
use crate::config::AlertPolicy;
use crate::error::{FeedError, Result};
use crate::feed_log;
use crate::model::{Alert, AlertId, AlertStatus};
use crate::store::StoreError;
use crate::tasks::spawn_periodic;

enum Command {
    Signal(AlertSignal),
    Transition {
        id: AlertId,
        to: AlertStatus,
        actor: String,
        reply: oneshot::Sender<Result<Alert>>,
    },
    List {
        only_active: bool,
        reply: oneshot::Sender<Vec<Alert>>,
    },
    SweepExpired {
        now: DateTime<Utc>,
        reply: oneshot::Sender<usize>,
    },
}

impl AlertEngine {
    async fn execute(&mut self, cmd: Command) {
        match cmd {
            Command::Signal(signal) => {
                self.handle(signal, Utc::now()).await;
            }
            Command::Transition { id, to, actor, reply } => {
                let _ = reply.send(self.transition(id, to, &actor, Utc::now()).await);
            }
            Command::List { only_active, reply } => {
                let _ = reply.send(if only_active { self.active_alerts() } else { self.alerts() });
            }
            Command::SweepExpired { now, reply } => {
                let _ = reply.send(self.sweep_expired(now).await);
            }
        }
    }

    /// Move the engine into its own task and start the expiry sweep.
    /// Commands already queued when `shutdown` fires are still processed.
    pub fn spawn(mut self, shutdown: CancellationToken) -> (AlertHandle, Vec<JoinHandle<()>>) {
        let policy = self.shared_policy();
        let (tx, mut rx) = mpsc::channel::<Command>(policy.signal_capacity.max(1));
        let handle = AlertHandle { tx, policy: policy.clone() };

        let stop = shutdown.clone();
        let actor = tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = stop.cancelled() => break,
                    cmd = rx.recv() => match cmd {
                        Some(cmd) => self.execute(cmd).await,
                        None => break,
                    },
                }
            }
            rx.close();
            while let Some(cmd) = rx.recv().await {
                self.execute(cmd).await;
            }
            feed_log!(Level::Debug, "alerts", "Alert engine stopped ({} alert(s))", self.alerts().len());
        });

        let sweeper = handle.clone();
        let expiry = spawn_periodic("alert-expiry", policy.expiry_sweep_period, shutdown, move || {
            let h = sweeper.clone();
            async move {
                match h.sweep_expired(Utc::now()).await {
                    Ok(0) => {}
                    Ok(n) => feed_log!(Level::Info, "alerts", "Expired {} alert(s)", n),
                    Err(e) => feed_log!(Level::Debug, "alerts", "Expiry sweep skipped: {}", e),
                }
            }
        });

        (handle, vec![actor, expiry])
    }
}

/// Cloneable front door to the alert engine task.
#[derive(Clone)]
pub struct AlertHandle {
    tx: mpsc::Sender<Command>,
    policy: Arc<AlertPolicy>,
}

fn engine_gone() -> FeedError {
    FeedError::Store(StoreError::Unavailable("alert engine stopped".into()))
}

impl AlertHandle {
    pub fn policy(&self) -> &AlertPolicy {
        &self.policy
    }

    /// Deliver a signal without waiting. Never fails the caller; returns
    /// `false` when the signal was dropped.
    pub fn signal(&self, signal: AlertSignal) -> bool {
        match self.tx.try_send(Command::Signal(signal)) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                metrics::counter!("alert_signals_dropped_total").increment(1);
                feed_log!(Level::Warn, "alerts", "Alert mailbox full, signal dropped");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                feed_log!(Level::Debug, "alerts", "Alert engine gone, signal dropped");
                false
            }
        }
    }

    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(make(reply)).await.map_err(|_| engine_gone())?;
        rx.await.map_err(|_| engine_gone())
    }

    pub async fn transition(&self, id: AlertId, to: AlertStatus, actor: &str) -> Result<Alert> {
        let actor = actor.to_owned();
        self.request(|reply| Command::Transition { id, to, actor, reply }).await?
    }

    pub async fn acknowledge(&self, id: AlertId, actor: &str) -> Result<Alert> {
        self.transition(id, AlertStatus::Acknowledged, actor).await
    }

    pub async fn resolve(&self, id: AlertId, actor: &str) -> Result<Alert> {
        self.transition(id, AlertStatus::Resolved, actor).await
    }

    pub async fn dismiss(&self, id: AlertId, actor: &str) -> Result<Alert> {
        self.transition(id, AlertStatus::Dismissed, actor).await
    }

    /// Every alert the engine knows, in id order. Also acts as a barrier:
    /// signals sent before this call have been applied when it returns.
    pub async fn alerts(&self) -> Result<Vec<Alert>> {
        self.request(|reply| Command::List { only_active: false, reply }).await
    }

    pub async fn active_alerts(&self) -> Result<Vec<Alert>> {
        self.request(|reply| Command::List { only_active: true, reply }).await
    }

    pub async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<usize> {
        self.request(|reply| Command::SweepExpired { now, reply }).await
    }
}
