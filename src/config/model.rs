// src/config/model.rs

use serde::{Deserialize, Deserializer};
use std::{net::SocketAddr, time::Duration};
use thiserror::Error;

use crate::model::FeedConfig;

/// Top-level runtime config
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub logging:    LoggingConfig,
    pub database:   DatabaseConfig,
    pub metrics:    MetricsConfig,
    pub supervisor: SupervisorConfig,
    pub scheduler:  SchedulerConfig,
    pub alerts:     AlertPolicy,
    /// Feeds registered with the in-process store at boot.
    pub feeds:      Vec<FeedConfig>,
}

/// Mirror of the `[logging]` table
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]            pub enable: bool,
    #[serde(default)]            pub file:   Option<String>,
    #[serde(default = "default_level")] pub level: String,
}
fn default_level() -> String { "INFO".into() }

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { enable: false, file: None, level: default_level() }
    }
}

/// Mirror of the `[database]` table: the optional SQLite archive of
/// outcomes and alerts.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub enable:             bool,
    pub path:               String,
    pub purge_on_restart:   bool,
    pub synchronous:        String,
    pub journal_size_limit: u64,
    pub ttl_seconds:        u64,
    pub flush_interval_ms:  u64,
    pub batch_size:         usize,
    /// Capacity of the channel in front of each writer.
    pub queue_capacity:     usize,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            enable:             false,
            path:               "feedwatch.db".into(),
            purge_on_restart:   false,
            synchronous:        "NORMAL".into(),
            journal_size_limit: 50_000_000,
            ttl_seconds:        7 * 24 * 3600,
            flush_interval_ms:  250,
            batch_size:         1_000,
            queue_capacity:     10_000,
        }
    }
}

/// Mirror of the `[metrics]` table
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Address for the Prometheus scrape endpoint; disabled when absent.
    pub listen: Option<SocketAddr>,
}

/// Mirror of the `[supervisor]` table
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    #[serde(deserialize_with = "human_duration")]
    pub health_period: Duration,
    /// A worker whose last heartbeat is older than this is unresponsive.
    #[serde(deserialize_with = "human_duration")]
    pub stale_threshold: Duration,
    /// Minimum gap between a stop and the next start in `restart_feed`.
    #[serde(deserialize_with = "human_duration")]
    pub restart_cooldown: Duration,
    /// Consecutive capture failures after which a worker gives up.
    pub max_capture_failures: u32,
    pub event_capacity: usize,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            health_period: Duration::from_secs(1),
            stale_threshold: Duration::from_secs(5),
            restart_cooldown: Duration::from_secs(1),
            max_capture_failures: 3,
            event_capacity: 4_096,
        }
    }
}

/// Mirror of the `[scheduler]` table
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub capacity: usize,
    #[serde(deserialize_with = "human_duration")]
    pub drain_period: Duration,
    /// Soft watermark above which the backlog counts as "over".
    pub backlog_watermark: usize,
    /// Consecutive over-watermark drain ticks before a backlog signal.
    pub backlog_persistence: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            capacity: 1_000,
            drain_period: Duration::from_secs(1),
            backlog_watermark: 100,
            backlog_persistence: 3,
        }
    }
}

/// Mirror of the `[alerts]` table: the thresholds the alert engine applies.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AlertPolicy {
    /// Detection count above which a detection alert is `high`.
    pub detection_high_count: usize,
    /// Staleness above which "worker unresponsive" escalates to critical.
    #[serde(deserialize_with = "human_duration")]
    pub unresponsive_critical_after: Duration,
    /// Lifetime of non-critical alerts.
    #[serde(deserialize_with = "human_duration")]
    pub default_expiry: Duration,
    #[serde(deserialize_with = "human_duration")]
    pub expiry_sweep_period: Duration,
    pub signal_capacity: usize,
}

impl Default for AlertPolicy {
    fn default() -> Self {
        Self {
            detection_high_count: 5,
            unresponsive_critical_after: Duration::from_secs(30),
            default_expiry: Duration::from_secs(24 * 3600),
            expiry_sweep_period: Duration::from_secs(60),
            signal_capacity: 1_024,
        }
    }
}

/// Accept `"5s"`, `"1m 30s"`, `"24h"` for duration fields.
fn human_duration<'de, D>(d: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(d)?;
    humantime::parse_duration(&raw)
        .map_err(|e| serde::de::Error::custom(ConfigError::InvalidDuration(raw, e)))
}

/// All the ways config loading can go wrong
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid duration '{0}': {1}")]
    InvalidDuration(String, #[source] humantime::DurationError),

    #[error("invalid value for {field}: {reason}")]
    Invalid { field: String, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}
