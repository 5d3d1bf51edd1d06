//! Worker supervision.
//!
//! Key responsibilities:
//! - Start, stop, restart and reconfigure per-feed workers.
//! - Own the active-feed registry and per-feed runtime statistics.
//! - Forward jobs from live workers to the scheduler, and nothing from a
//!   worker generation that has been stopped.
//! - Sweep heartbeats and report unresponsive workers to the alert engine.
//!
//! Operations on the same feed are serialised by a per-feed async lock;
//! different feeds proceed in parallel. The registry itself sits behind a
//! plain mutex that is never held across an await point.

pub mod health;
pub mod runtime;

use log::Level;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{mpsc, OwnedMutexGuard};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::alerts::{AlertHandle, AlertSignal};
use crate::config::SupervisorConfig;
use crate::error::{FeedError, Result};
use crate::feed_log;
use crate::model::{FeedConfig, FeedId, FeedStatus};
use crate::scheduler::JobScheduler;
use crate::store::FeedStore;
use crate::tasks::spawn_periodic;
use crate::worker::{FrameSource, WorkerEvent, WorkerHandle};

use health::StaleLevel;
pub use runtime::{WorkerRuntimeState, WorkerStatus};

/// Outcome of a stop request. Stopping an idle feed is not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopStatus {
    Stopped,
    AlreadyStopped,
}

struct Entry {
    handle: WorkerHandle,
    config: Arc<FeedConfig>,
    state: WorkerRuntimeState,
    stale: StaleLevel,
}

#[derive(Default)]
struct Registry {
    entries: HashMap<FeedId, Entry>,
    last_stopped: HashMap<FeedId, Instant>,
}

impl Registry {
    /// The entry for `id` if it still belongs to `generation`.
    fn current(&mut self, id: &FeedId, generation: u64) -> Option<&mut Entry> {
        self.entries.get_mut(id).filter(|e| e.state.generation == generation)
    }
}

struct Inner {
    cfg: SupervisorConfig,
    store: Arc<dyn FeedStore>,
    scheduler: JobScheduler,
    alerts: AlertHandle,
    source: Arc<dyn FrameSource>,
    registry: Mutex<Registry>,
    feed_locks: Mutex<HashMap<FeedId, Arc<tokio::sync::Mutex<()>>>>,
    events: mpsc::Sender<WorkerEvent>,
    next_generation: AtomicU64,
}

#[derive(Clone)]
pub struct WorkerSupervisor {
    inner: Arc<Inner>,
}

impl WorkerSupervisor {
    /// Build the supervisor and spawn its event pump and health sweep.
    pub fn spawn(
        cfg: SupervisorConfig,
        store: Arc<dyn FeedStore>,
        scheduler: JobScheduler,
        alerts: AlertHandle,
        source: Arc<dyn FrameSource>,
        shutdown: CancellationToken,
    ) -> (Self, Vec<JoinHandle<()>>) {
        let (events, rx) = mpsc::channel(cfg.event_capacity.max(1));
        let health_period = cfg.health_period;
        let sup = Self {
            inner: Arc::new(Inner {
                cfg,
                store,
                scheduler,
                alerts,
                source,
                registry: Mutex::new(Registry::default()),
                feed_locks: Mutex::new(HashMap::new()),
                events,
                next_generation: AtomicU64::new(0),
            }),
        };

        let pump = tokio::spawn(sup.clone().pump(rx, shutdown.clone()));
        let sweeper = sup.clone();
        let health = spawn_periodic("health-sweep", health_period, shutdown, move || {
            let s = sweeper.clone();
            async move {
                s.sweep_health(Instant::now());
            }
        });
        (sup, vec![pump, health])
    }

    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.inner.registry.lock().unwrap_or_else(|p| p.into_inner())
    }

    async fn lock_feed(&self, id: &FeedId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.inner.feed_locks.lock().unwrap_or_else(|p| p.into_inner());
            locks.entry(id.clone()).or_default().clone()
        };
        lock.lock_owned().await
    }

    // ───── lifecycle ───────────────────────────────────────────────────────

    pub async fn start_feed(&self, id: &FeedId) -> Result<()> {
        let _guard = self.lock_feed(id).await;
        if self.registry().entries.contains_key(id) {
            return Err(FeedError::AlreadyActive(id.clone()));
        }
        let config = self.inner.store.load_feed_config(id).await?;
        self.launch(Arc::new(config)).await
    }

    pub async fn stop_feed(&self, id: &FeedId) -> Result<StopStatus> {
        let _guard = self.lock_feed(id).await;
        self.stop_locked(id).await
    }

    /// Stop, wait out the cooldown since this feed's last stop, start again
    /// from the stored configuration.
    pub async fn restart_feed(&self, id: &FeedId) -> Result<()> {
        let _guard = self.lock_feed(id).await;
        self.stop_locked(id).await?;
        let config = self.inner.store.load_feed_config(id).await?;
        self.wait_cooldown(id).await;
        self.launch(Arc::new(config)).await
    }

    /// Persist a new configuration; a running feed is restarted with it.
    pub async fn update_feed(&self, id: &FeedId, config: FeedConfig) -> Result<()> {
        if config.id != *id {
            return Err(FeedError::Config {
                feed_id: id.clone(),
                reason: format!("configuration names feed '{}'", config.id),
            });
        }
        config.validate().map_err(|reason| FeedError::Config { feed_id: id.clone(), reason })?;

        let _guard = self.lock_feed(id).await;
        self.inner.store.save_feed_config(&config).await?;
        feed_log!(Level::Info, "supervisor", "Feed {} configuration updated", id);

        let running = self.registry().entries.contains_key(id);
        if running {
            self.stop_locked(id).await?;
            self.wait_cooldown(id).await;
            self.launch(Arc::new(config)).await?;
        }
        Ok(())
    }

    /// Stop every registered feed; returns how many were running.
    pub async fn stop_all(&self) -> usize {
        let mut stopped = 0;
        for id in self.active_feeds() {
            match self.stop_feed(&id).await {
                Ok(StopStatus::Stopped) => stopped += 1,
                Ok(StopStatus::AlreadyStopped) => {}
                Err(e) => feed_log!(Level::Error, "supervisor", "Stopping {} failed: {}", id, e),
            }
        }
        stopped
    }

    async fn launch(&self, config: Arc<FeedConfig>) -> Result<()> {
        let id = config.id.clone();
        let generation = self.inner.next_generation.fetch_add(1, Ordering::SeqCst) + 1;
        {
            // Registering under the same lock the pump takes means the
            // worker's first heartbeat cannot arrive before its entry.
            let mut reg = self.registry();
            let mut handle = WorkerHandle::new(
                id.clone(),
                generation,
                self.inner.source.clone(),
                self.inner.events.clone(),
                self.inner.cfg.max_capture_failures,
            );
            handle.start(config.clone())?;
            reg.entries.insert(
                id.clone(),
                Entry {
                    handle,
                    config,
                    state: WorkerRuntimeState::new(generation, Instant::now()),
                    stale: StaleLevel::Fresh,
                },
            );
            metrics::gauge!("active_feeds").set(reg.entries.len() as f64);
        }

        if let Err(e) = self.inner.store.set_feed_status(&id, FeedStatus::Active).await {
            self.teardown(&id);
            return Err(e.into());
        }
        feed_log!(Level::Info, "supervisor", "Feed {} started (gen {})", id, generation);
        Ok(())
    }

    async fn stop_locked(&self, id: &FeedId) -> Result<StopStatus> {
        let Some(entry) = self.teardown(id) else {
            feed_log!(Level::Debug, "supervisor", "Feed {} not running", id);
            return Ok(StopStatus::AlreadyStopped);
        };
        self.inner.store.set_feed_status(id, FeedStatus::Inactive).await?;
        feed_log!(
            Level::Info,
            "supervisor",
            "Feed {} stopped (gen {}, {} frame(s), {} error(s))",
            id,
            entry.state.generation,
            entry.state.frames_captured,
            entry.state.total_errors
        );
        Ok(StopStatus::Stopped)
    }

    /// Remove `id` from the registry, stop its worker and retire its jobs.
    /// After this returns no job of that generation reaches the scheduler.
    fn teardown(&self, id: &FeedId) -> Option<Entry> {
        let mut reg = self.registry();
        let mut entry = reg.entries.remove(id)?;
        entry.handle.stop();
        entry.state.status = WorkerStatus::Stopped;
        self.inner.scheduler.retire_feed(id, entry.state.generation);
        reg.last_stopped.insert(id.clone(), Instant::now());
        metrics::gauge!("active_feeds").set(reg.entries.len() as f64);
        Some(entry)
    }

    async fn wait_cooldown(&self, id: &FeedId) {
        if let Some(at) = self.last_stopped_at(id) {
            tokio::time::sleep_until(at + self.inner.cfg.restart_cooldown).await;
        }
    }

    // ───── inspection ──────────────────────────────────────────────────────

    pub fn snapshot(&self, id: &FeedId) -> Option<WorkerRuntimeState> {
        self.registry().entries.get(id).map(|e| e.state.clone())
    }

    pub fn running_config(&self, id: &FeedId) -> Option<Arc<FeedConfig>> {
        self.registry().entries.get(id).map(|e| e.config.clone())
    }

    pub fn active_feeds(&self) -> Vec<FeedId> {
        let mut ids: Vec<_> = self.registry().entries.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn last_stopped_at(&self, id: &FeedId) -> Option<Instant> {
        self.registry().last_stopped.get(id).copied()
    }

    // ───── event pump & health ─────────────────────────────────────────────

    async fn pump(self, mut rx: mpsc::Receiver<WorkerEvent>, shutdown: CancellationToken) {
        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                ev = rx.recv() => match ev {
                    Some(ev) => self.on_event(ev).await,
                    None => break,
                },
            }
        }
        feed_log!(Level::Debug, "supervisor", "Event pump stopped");
    }

    async fn on_event(&self, ev: WorkerEvent) {
        match ev {
            WorkerEvent::FrameCaptured { feed_id, generation, seq, at } => {
                if let Some(e) = self.registry().current(&feed_id, generation) {
                    e.state.record_heartbeat(seq, at);
                    e.stale = StaleLevel::Fresh;
                }
            }
            WorkerEvent::JobReady(job) => {
                // Submitting under the registry lock orders every submit
                // strictly before or after a concurrent teardown.
                let mut reg = self.registry();
                if reg.current(&job.feed_id, job.generation).is_none() {
                    metrics::counter!("jobs_dropped_total").increment(1);
                    return;
                }
                if let Err(e) = self.inner.scheduler.submit(job) {
                    feed_log!(Level::Debug, "supervisor", "Job not queued: {}", e);
                }
            }
            WorkerEvent::CaptureFailed { feed_id, generation, consecutive, error } => {
                let current = match self.registry().current(&feed_id, generation) {
                    Some(e) => {
                        e.state.record_failure(consecutive);
                        true
                    }
                    None => false,
                };
                if current {
                    feed_log!(Level::Debug, "supervisor", "Feed {} capture error: {}", feed_id, error);
                    if let Err(e) = self.inner.store.increment_feed_stats(&feed_id, 0, true).await {
                        feed_log!(Level::Error, "supervisor", "Stats update for {} failed: {}", feed_id, e);
                    }
                }
            }
            WorkerEvent::WorkerFailed { feed_id, generation, reason } => {
                let current = match self.registry().current(&feed_id, generation) {
                    Some(e) => {
                        e.state.status = WorkerStatus::Error;
                        true
                    }
                    None => false,
                };
                if current {
                    feed_log!(Level::Error, "supervisor", "Feed {} failed: {}", feed_id, reason);
                    if let Err(e) = self.inner.store.set_feed_status(&feed_id, FeedStatus::Error).await {
                        feed_log!(Level::Error, "supervisor", "Status update for {} failed: {}", feed_id, e);
                    }
                    self.inner.alerts.signal(AlertSignal::WorkerFailed { feed_id, reason });
                }
            }
        }
    }

    /// Check every live, non-failed worker's last heartbeat against `now`.
    /// Returns the number of signals delivered.
    ///
    /// A feed's stale level only advances once its signal is in the alert
    /// mailbox, so a dropped signal is retried on the next sweep.
    pub fn sweep_health(&self, now: Instant) -> usize {
        let stale_threshold = self.inner.cfg.stale_threshold;
        let critical_after = self.inner.alerts.policy().unresponsive_critical_after;

        let mut sent = 0;
        let mut reg = self.registry();
        for (id, e) in reg.entries.iter_mut() {
            if e.state.status == WorkerStatus::Error {
                continue;
            }
            let stale_for = e.state.stale_for(now);
            let (next, signal) = health::assess(e.stale, stale_for, stale_threshold, critical_after);
            if !signal {
                e.stale = next;
                continue;
            }
            feed_log!(Level::Warn, "supervisor", "Feed {} silent for {:?}", id, stale_for);
            let unresponsive = AlertSignal::WorkerUnresponsive { feed_id: id.clone(), stale_for };
            if self.inner.alerts.signal(unresponsive) {
                e.stale = next;
                sent += 1;
            }
        }
        sent
    }
}
