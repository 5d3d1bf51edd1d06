// src/worker/handle.rs

//! Worker lifecycle (`WorkerHandle`) and the per-tick capture logic
//! (`CaptureLoop`).
//!
//! A handle is started once and stopped once; a restart builds a new handle
//! with a new generation.

use chrono::Utc;
use log::Level;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::source::FrameSource;
use super::WorkerEvent;
use crate::error::{FeedError, Result};
use crate::feed_log;
use crate::model::{AnalysisJob, FeedConfig, FeedId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerPhase {
    Idle,
    Active,
    Stopped,
    Error,
}

pub struct WorkerHandle {
    feed_id: FeedId,
    generation: u64,
    source: Arc<dyn FrameSource>,
    events: mpsc::Sender<WorkerEvent>,
    max_failures: u32,
    phase: Arc<Mutex<WorkerPhase>>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl WorkerHandle {
    pub fn new(
        feed_id: FeedId,
        generation: u64,
        source: Arc<dyn FrameSource>,
        events: mpsc::Sender<WorkerEvent>,
        max_failures: u32,
    ) -> Self {
        Self {
            feed_id,
            generation,
            source,
            events,
            max_failures: max_failures.max(1),
            phase: Arc::new(Mutex::new(WorkerPhase::Idle)),
            cancel: CancellationToken::new(),
            task: None,
        }
    }

    pub fn feed_id(&self) -> &FeedId {
        &self.feed_id
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn phase(&self) -> WorkerPhase {
        *lock(&self.phase)
    }

    /// Validate `config` and spawn the capture loop. Must be called from
    /// within a Tokio runtime.
    pub fn start(&mut self, config: Arc<FeedConfig>) -> Result<()> {
        if config.id != self.feed_id {
            return Err(FeedError::Config {
                feed_id: self.feed_id.clone(),
                reason: format!("configuration belongs to feed '{}'", config.id),
            });
        }
        config.validate().map_err(|reason| FeedError::Config {
            feed_id: self.feed_id.clone(),
            reason,
        })?;

        {
            let mut phase = lock(&self.phase);
            match *phase {
                WorkerPhase::Idle => *phase = WorkerPhase::Active,
                WorkerPhase::Active => return Err(FeedError::AlreadyActive(self.feed_id.clone())),
                finished => {
                    return Err(FeedError::Config {
                        feed_id: self.feed_id.clone(),
                        reason: format!(
                            "worker generation {} already finished ({:?})",
                            self.generation, finished
                        ),
                    });
                }
            }
        }

        feed_log!(
            Level::Info,
            "worker",
            "Feed {} gen {} starting at {} fps ({} model(s))",
            self.feed_id,
            self.generation,
            config.fps,
            config.active_models().count()
        );

        let capture = CaptureLoop::new(
            config,
            self.generation,
            self.source.clone(),
            self.events.clone(),
            self.max_failures,
        );
        self.task = Some(tokio::spawn(capture.run(self.cancel.clone(), self.phase.clone())));
        Ok(())
    }

    /// Stop capturing. Calling it again, or on a failed worker, is a no-op
    /// apart from the phase change.
    pub fn stop(&mut self) {
        {
            let mut phase = lock(&self.phase);
            if *phase == WorkerPhase::Stopped {
                return;
            }
            *phase = WorkerPhase::Stopped;
        }
        self.cancel.cancel();
        self.task = None;
        feed_log!(Level::Info, "worker", "Feed {} gen {} stopped", self.feed_id, self.generation);
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn lock(phase: &Mutex<WorkerPhase>) -> std::sync::MutexGuard<'_, WorkerPhase> {
    phase.lock().unwrap_or_else(|p| p.into_inner())
}

/// What a single tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Frame `seq` captured and its jobs emitted.
    Captured(u64),
    /// Capture failed; the value is the consecutive failure count.
    Failed(u32),
    /// Failure threshold reached; the loop must end.
    GaveUp,
    /// The supervisor dropped the event channel.
    Disconnected,
}

/// Capture state for one worker generation.
pub struct CaptureLoop {
    config: Arc<FeedConfig>,
    generation: u64,
    source: Arc<dyn FrameSource>,
    events: mpsc::Sender<WorkerEvent>,
    next_seq: u64,
    consecutive_failures: u32,
    max_failures: u32,
}

impl CaptureLoop {
    pub fn new(
        config: Arc<FeedConfig>,
        generation: u64,
        source: Arc<dyn FrameSource>,
        events: mpsc::Sender<WorkerEvent>,
        max_failures: u32,
    ) -> Self {
        Self {
            config,
            generation,
            source,
            events,
            next_seq: 1,
            consecutive_failures: 0,
            max_failures: max_failures.max(1),
        }
    }

    pub fn frames_captured(&self) -> u64 {
        self.next_seq - 1
    }

    async fn emit(&self, ev: WorkerEvent) -> bool {
        self.events.send(ev).await.is_ok()
    }

    /// Capture one frame, then report it and one job per active model.
    /// Sequence numbers only advance on success, so they are gap-free.
    pub async fn on_tick(&mut self) -> TickOutcome {
        let feed_id = &self.config.id;
        let seq = self.next_seq;

        match self.source.capture(&self.config.source, self.config.resolution, seq).await {
            Ok(_frame) => {
                self.next_seq += 1;
                self.consecutive_failures = 0;

                let heartbeat = WorkerEvent::FrameCaptured {
                    feed_id: feed_id.clone(),
                    generation: self.generation,
                    seq,
                    at: Instant::now(),
                };
                if !self.emit(heartbeat).await {
                    return TickOutcome::Disconnected;
                }

                for model in self.config.active_models() {
                    let job = AnalysisJob {
                        feed_id: feed_id.clone(),
                        generation: self.generation,
                        model: model.kind.clone(),
                        confidence_threshold: model.confidence_threshold,
                        frame_seq: seq,
                        submitted_at: Utc::now(),
                        priority: self.config.priority,
                    };
                    if !self.emit(WorkerEvent::JobReady(job)).await {
                        return TickOutcome::Disconnected;
                    }
                }
                TickOutcome::Captured(seq)
            }
            Err(error) => {
                self.consecutive_failures += 1;
                let n = self.consecutive_failures;
                metrics::counter!("capture_failures_total").increment(1);
                feed_log!(
                    Level::Warn,
                    "worker",
                    "Feed {} capture failed ({}/{}): {}",
                    feed_id,
                    n,
                    self.max_failures,
                    error
                );

                let reason = format!("{} consecutive capture failures, last: {}", n, error);
                let failed = WorkerEvent::CaptureFailed {
                    feed_id: feed_id.clone(),
                    generation: self.generation,
                    consecutive: n,
                    error,
                };
                if !self.emit(failed).await {
                    return TickOutcome::Disconnected;
                }

                if n < self.max_failures {
                    return TickOutcome::Failed(n);
                }
                // Best effort: the loop ends either way.
                let _ = self
                    .emit(WorkerEvent::WorkerFailed {
                        feed_id: feed_id.clone(),
                        generation: self.generation,
                        reason,
                    })
                    .await;
                TickOutcome::GaveUp
            }
        }
    }

    /// Tick at `1 / fps` until cancelled or the failure threshold is hit.
    /// Cancellation also interrupts a capture that is in progress.
    pub async fn run(mut self, cancel: CancellationToken, phase: Arc<Mutex<WorkerPhase>>) {
        let mut ticker = interval(self.config.frame_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                o = self.on_tick() => o,
            };
            match outcome {
                TickOutcome::GaveUp => {
                    let mut p = lock(&phase);
                    if *p == WorkerPhase::Active {
                        *p = WorkerPhase::Error;
                    }
                    break;
                }
                TickOutcome::Disconnected => break,
                TickOutcome::Captured(_) | TickOutcome::Failed(_) => {}
            }
        }
        feed_log!(
            Level::Debug,
            "worker",
            "Feed {} gen {} loop exited after {} frame(s)",
            self.config.id,
            self.generation,
            self.frames_captured()
        );
    }
}
