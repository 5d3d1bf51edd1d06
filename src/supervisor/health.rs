// src/supervisor/health.rs

//! Stale-episode tracking for the health sweep.
//!
//! An episode starts when a worker's silence first exceeds the stale
//! threshold and ends with its next heartbeat. Within one episode the
//! supervisor signals at most twice: once on entry, once more when the
//! silence crosses the critical threshold.

use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StaleLevel {
    #[default]
    Fresh,
    Warned,
    Escalated,
}

/// Next level for a feed silent for `stale_for`, and whether to signal.
pub fn assess(
    level: StaleLevel,
    stale_for: Duration,
    stale_threshold: Duration,
    critical_after: Duration,
) -> (StaleLevel, bool) {
    if stale_for <= stale_threshold {
        return (StaleLevel::Fresh, false);
    }
    let critical = stale_for > critical_after;
    match level {
        StaleLevel::Fresh if critical => (StaleLevel::Escalated, true),
        StaleLevel::Fresh => (StaleLevel::Warned, true),
        StaleLevel::Warned if critical => (StaleLevel::Escalated, true),
        StaleLevel::Warned => (StaleLevel::Warned, false),
        StaleLevel::Escalated => (StaleLevel::Escalated, false),
    }
}
