// src/config/loader.rs

//! # Configuration Loader
//!
//! Reads `feedwatch.toml`, deserializes into `Config` and checks the values
//! serde cannot express (zero capacities, inverted thresholds, bad feeds).

use crate::feed_log;
use super::model::{Config, ConfigError};
use log::Level;
use std::{collections::HashSet, fs, path::Path};

/// Load, parse and validate the configuration at `path`.
/// Logs at DEBUG before reading and INFO on success.
pub fn load(path: &Path) -> Result<Config, ConfigError> {
    feed_log!(Level::Debug, "config", "Reading config from {:?}", path);
    let txt = fs::read_to_string(path)?;
    let cfg = parse(&txt)?;
    feed_log!(Level::Info, "config", "Loaded config from {:?} ({} feed(s))", path, cfg.feeds.len());
    Ok(cfg)
}

/// Parse and validate configuration text.
pub fn parse(txt: &str) -> Result<Config, ConfigError> {
    let cfg: Config = toml::from_str(txt)?;
    validate(&cfg)?;
    Ok(cfg)
}

fn invalid(field: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid { field: field.into(), reason: reason.into() }
}

fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.scheduler.capacity == 0 {
        return Err(invalid("scheduler.capacity", "must be at least 1"));
    }
    if cfg.scheduler.backlog_watermark > cfg.scheduler.capacity {
        return Err(invalid(
            "scheduler.backlog_watermark",
            format!("{} exceeds capacity {}", cfg.scheduler.backlog_watermark, cfg.scheduler.capacity),
        ));
    }
    if cfg.scheduler.drain_period.is_zero() {
        return Err(invalid("scheduler.drain_period", "must be non-zero"));
    }
    if cfg.supervisor.health_period.is_zero() {
        return Err(invalid("supervisor.health_period", "must be non-zero"));
    }
    if cfg.supervisor.restart_cooldown.is_zero() {
        return Err(invalid("supervisor.restart_cooldown", "must be non-zero"));
    }
    if cfg.supervisor.max_capture_failures == 0 {
        return Err(invalid("supervisor.max_capture_failures", "must be at least 1"));
    }
    if cfg.alerts.unresponsive_critical_after <= cfg.supervisor.stale_threshold {
        return Err(invalid(
            "alerts.unresponsive_critical_after",
            "must be larger than supervisor.stale_threshold",
        ));
    }

    let mut seen = HashSet::new();
    for feed in &cfg.feeds {
        if !seen.insert(feed.id.clone()) {
            return Err(invalid("feeds", format!("duplicate feed id '{}'", feed.id)));
        }
        feed.validate()
            .map_err(|reason| invalid(&format!("feeds.{}", feed.id), reason))?;
    }
    Ok(())
}
