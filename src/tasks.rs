// src/tasks.rs

//! Single-flight periodic tasks.
//!
//! Every background loop in the crate (scheduler drain, health sweep, alert
//! expiry, archive TTL) goes through [`spawn_periodic`]: the next tick is not
//! started until the previous one has completed, and ticks missed while a
//! slow run was in progress are skipped rather than replayed in a burst.

use log::Level;
use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::feed_log;

/// Run `tick` every `period` until `shutdown` is cancelled.
///
/// The first run happens one full `period` after spawning.
pub fn spawn_periodic<F, Fut>(
    name: &'static str,
    period: Duration,
    shutdown: CancellationToken,
    mut tick: F,
) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // `interval` fires immediately; consume that so the first run is one period out.
        ticker.tick().await;
        feed_log!(Level::Debug, "tasks", "Periodic task '{}' started (period={:?})", name, period);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => tick().await,
            }
        }
        feed_log!(Level::Debug, "tasks", "Periodic task '{}' stopped", name);
    })
}
