//! Central job scheduler.
//!
//! Key responsibilities:
//! - Hold submitted analysis jobs in a bounded priority queue.
//! - Drain exactly one job per tick through a single execution slot.
//! - Route each outcome to the result store and the alert engine.
//! - Watch the backlog and raise a back-pressure signal when it persists.
//! - Forget jobs from feed generations the supervisor has retired.

pub mod analyzer;
pub mod queue;

use chrono::Utc;
use log::Level;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::alerts::{AlertHandle, AlertSignal};
use crate::config::SchedulerConfig;
use crate::error::{FeedError, Result};
use crate::feed_log;
use crate::model::{AnalysisJob, AnalysisOutcome, FeedId, OutcomePayload};
use crate::store::FeedStore;
use crate::tasks::spawn_periodic;

pub use analyzer::{AnalysisError, Analyzer, SimulatedAnalyzer};
pub use queue::JobQueue;

/// Counter snapshot returned by [`JobScheduler::stats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub submitted: u64,
    pub rejected: u64,
    pub executed: u64,
    pub failed: u64,
    /// Jobs discarded because their feed generation was retired.
    pub dropped: u64,
    pub backlog_signals: u64,
}

/// Result of one drain tick.
#[derive(Debug, Clone, PartialEq)]
pub enum DrainResult {
    Idle,
    Executed(AnalysisOutcome),
    /// The job (or its outcome) belonged to a retired feed generation.
    Dropped { feed_id: FeedId, frame_seq: u64 },
}

#[derive(Default)]
struct Counters {
    submitted: AtomicU64,
    rejected: AtomicU64,
    executed: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
    backlog_signals: AtomicU64,
}

struct State {
    queue: JobQueue,
    /// Highest retired generation per feed.
    retired: HashMap<FeedId, u64>,
    submitted: HashMap<FeedId, u64>,
    over_watermark_ticks: u32,
}

impl State {
    fn is_retired(&self, job: &AnalysisJob) -> bool {
        self.retired.get(&job.feed_id).is_some_and(|g| job.generation <= *g)
    }
}

struct Inner {
    cfg: SchedulerConfig,
    state: Mutex<State>,
    /// The single execution slot.
    slot: tokio::sync::Mutex<()>,
    analyzer: Arc<dyn Analyzer>,
    store: Arc<dyn FeedStore>,
    alerts: AlertHandle,
    counters: Counters,
}

/// Cloneable handle; all clones share one queue.
#[derive(Clone)]
pub struct JobScheduler {
    inner: Arc<Inner>,
}

impl JobScheduler {
    pub fn new(
        cfg: SchedulerConfig,
        analyzer: Arc<dyn Analyzer>,
        store: Arc<dyn FeedStore>,
        alerts: AlertHandle,
    ) -> Self {
        let state = State {
            queue: JobQueue::new(cfg.capacity),
            retired: HashMap::new(),
            submitted: HashMap::new(),
            over_watermark_ticks: 0,
        };
        Self {
            inner: Arc::new(Inner {
                cfg,
                state: Mutex::new(state),
                slot: tokio::sync::Mutex::new(()),
                analyzer,
                store,
                alerts,
                counters: Counters::default(),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.inner.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Enqueue one job. Never blocks; a full queue or a stopped feed is
    /// reported, not hidden.
    pub fn submit(&self, job: AnalysisJob) -> Result<()> {
        let c = &self.inner.counters;
        let mut st = self.state();

        if st.is_retired(&job) {
            c.dropped.fetch_add(1, Ordering::Relaxed);
            metrics::counter!("jobs_dropped_total").increment(1);
            feed_log!(
                Level::Debug,
                "scheduler",
                "Ignoring job for retired feed {} gen {}",
                job.feed_id,
                job.generation
            );
            return Err(FeedError::FeedStopped { feed_id: job.feed_id, generation: job.generation });
        }

        let feed_id = job.feed_id.clone();
        match st.queue.push(job) {
            Ok(()) => {
                *st.submitted.entry(feed_id).or_default() += 1;
                c.submitted.fetch_add(1, Ordering::Relaxed);
                metrics::counter!("jobs_submitted_total").increment(1);
                metrics::gauge!("job_queue_depth").set(st.queue.len() as f64);
                Ok(())
            }
            Err(rejected) => {
                c.rejected.fetch_add(1, Ordering::Relaxed);
                metrics::counter!("jobs_rejected_total").increment(1);
                feed_log!(
                    Level::Warn,
                    "scheduler",
                    "Queue full ({}), rejected {} frame {}",
                    st.queue.capacity(),
                    rejected.feed_id,
                    rejected.frame_seq
                );
                Err(FeedError::QueueFull { capacity: st.queue.capacity() })
            }
        }
    }

    /// Submit each job independently; earlier successes are kept when a
    /// later job is rejected.
    pub fn submit_batch(&self, jobs: impl IntoIterator<Item = AnalysisJob>) -> Vec<Result<()>> {
        jobs.into_iter().map(|job| self.submit(job)).collect()
    }

    /// Discard queued jobs of `feed_id` up to `generation`, and any outcome
    /// of such a job still in flight. Returns how many queued jobs went.
    pub fn retire_feed(&self, feed_id: &FeedId, generation: u64) -> usize {
        let mut st = self.state();
        let g = st.retired.entry(feed_id.clone()).or_insert(0);
        *g = (*g).max(generation);

        let purged = st
            .queue
            .retain(|j| !(j.feed_id == *feed_id && j.generation <= generation));
        if purged > 0 {
            self.inner.counters.dropped.fetch_add(purged as u64, Ordering::Relaxed);
            metrics::counter!("jobs_dropped_total").increment(purged as u64);
            metrics::gauge!("job_queue_depth").set(st.queue.len() as f64);
        }
        feed_log!(
            Level::Debug,
            "scheduler",
            "Retired {} up to gen {} ({} queued job(s) purged)",
            feed_id,
            generation,
            purged
        );
        purged
    }

    pub fn backlog(&self) -> usize {
        self.state().queue.len()
    }

    /// Jobs accepted for `feed_id` since the scheduler was created.
    pub fn submitted_for(&self, feed_id: &FeedId) -> u64 {
        self.state().submitted.get(feed_id).copied().unwrap_or(0)
    }

    pub fn stats(&self) -> SchedulerStats {
        let c = &self.inner.counters;
        SchedulerStats {
            submitted: c.submitted.load(Ordering::Relaxed),
            rejected: c.rejected.load(Ordering::Relaxed),
            executed: c.executed.load(Ordering::Relaxed),
            failed: c.failed.load(Ordering::Relaxed),
            dropped: c.dropped.load(Ordering::Relaxed),
            backlog_signals: c.backlog_signals.load(Ordering::Relaxed),
        }
    }

    /// One drain tick: check the backlog, pop the best job, run it, route
    /// the outcome.
    pub async fn drain_once(&self) -> DrainResult {
        let _slot = self.inner.slot.lock().await;
        let c = &self.inner.counters;

        let (job, backlog) = {
            let mut st = self.state();
            let depth = st.queue.len();
            let mut backlog = None;
            if depth > self.inner.cfg.backlog_watermark {
                st.over_watermark_ticks += 1;
                if st.over_watermark_ticks >= self.inner.cfg.backlog_persistence {
                    st.over_watermark_ticks = 0;
                    backlog = Some(depth);
                }
            } else {
                st.over_watermark_ticks = 0;
            }
            let job = st.queue.pop();
            metrics::gauge!("job_queue_depth").set(st.queue.len() as f64);
            (job, backlog)
        };

        if let Some(size) = backlog {
            c.backlog_signals.fetch_add(1, Ordering::Relaxed);
            feed_log!(
                Level::Warn,
                "scheduler",
                "Backlog {} above watermark {} for {} tick(s)",
                size,
                self.inner.cfg.backlog_watermark,
                self.inner.cfg.backlog_persistence
            );
            self.inner.alerts.signal(AlertSignal::QueueBacklog {
                size,
                watermark: self.inner.cfg.backlog_watermark,
            });
        }

        let Some(job) = job else {
            return DrainResult::Idle;
        };

        let started = Instant::now();
        let outcome = match self.inner.analyzer.analyze(&job).await {
            Ok(o) => o,
            Err(e) => {
                c.failed.fetch_add(1, Ordering::Relaxed);
                let err = FeedError::from(e);
                feed_log!(Level::Warn, "scheduler", "{} frame {}: {}", job.feed_id, job.frame_seq, err);
                AnalysisOutcome {
                    feed_id: job.feed_id.clone(),
                    model: job.model_name().to_owned(),
                    frame_seq: job.frame_seq,
                    success: false,
                    confidence: 0.0,
                    payload: OutcomePayload::Empty,
                    error: Some(err.to_string()),
                    processing_time: started.elapsed(),
                    timestamp: Utc::now(),
                }
            }
        };

        // The feed may have been stopped while the model ran.
        if self.state().is_retired(&job) {
            c.dropped.fetch_add(1, Ordering::Relaxed);
            metrics::counter!("jobs_dropped_total").increment(1);
            feed_log!(
                Level::Debug,
                "scheduler",
                "Dropping outcome of {} frame {} (feed stopped)",
                job.feed_id,
                job.frame_seq
            );
            return DrainResult::Dropped { feed_id: job.feed_id, frame_seq: job.frame_seq };
        }

        let store = &self.inner.store;
        if let Err(e) = store.save_analysis_outcome(&outcome).await {
            feed_log!(Level::Error, "scheduler", "Saving outcome for {} failed: {}", job.feed_id, e);
        }
        if let Err(e) = store.increment_feed_stats(&job.feed_id, 1, !outcome.success).await {
            feed_log!(Level::Error, "scheduler", "Updating stats for {} failed: {}", job.feed_id, e);
        }
        self.inner.alerts.signal(AlertSignal::Outcome {
            outcome: outcome.clone(),
            threshold: job.confidence_threshold,
        });

        c.executed.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("jobs_executed_total", "model" => job.model_name()).increment(1);
        metrics::histogram!("job_latency_seconds")
            .record((Utc::now() - job.submitted_at).to_std().unwrap_or_default().as_secs_f64());
        DrainResult::Executed(outcome)
    }

    /// Spawn the fixed-cadence drain loop.
    pub fn spawn(&self, shutdown: CancellationToken) -> JoinHandle<()> {
        let this = self.clone();
        spawn_periodic("scheduler-drain", self.inner.cfg.drain_period, shutdown, move || {
            let this = this.clone();
            async move {
                this.drain_once().await;
            }
        })
    }
}
