// tests/config_tests.rs

//! Configuration loading: defaults, durations, feed tables and validation.

use std::{io::Write, time::Duration};

use feedwatch::config::{self, ConfigError};
use feedwatch::model::{ModelKind, Priority, SourceKind};

const SAMPLE: &str = r#"
[logging]
enable = true
level = "DEBUG"

[supervisor]
health_period = "500ms"
stale_threshold = "5s"
restart_cooldown = "2s"

[scheduler]
capacity = 200
drain_period = "1s"
backlog_watermark = 50

[alerts]
unresponsive_critical_after = "45s"
default_expiry = "12h"

[[feeds]]
id = "dock-east"
name = "Dock east"
fps = 2.5
priority = "high"
source = { kind = "rtsp", address = "rtsp://10.0.0.21/stream1" }

  [[feeds.models]]
  type = "object-detection"
  confidence_threshold = 0.6
  params = { classes = ["person", "forklift"] }

  [[feeds.models]]
  type = "motion-detection"
  active = false
  params = { sensitivity = 0.8 }

[[feeds]]
id = "gate"
fps = 1.0
source = { kind = "http", address = "http://10.0.0.30/snapshot.jpg" }
"#;

#[test]
fn empty_file_gives_defaults() {
    let cfg = config::parse("").unwrap();
    assert_eq!(cfg.scheduler.capacity, 1_000);
    assert_eq!(cfg.scheduler.backlog_watermark, 100);
    assert_eq!(cfg.supervisor.stale_threshold, Duration::from_secs(5));
    assert_eq!(cfg.supervisor.restart_cooldown, Duration::from_secs(1));
    assert_eq!(cfg.alerts.detection_high_count, 5);
    assert_eq!(cfg.alerts.unresponsive_critical_after, Duration::from_secs(30));
    assert_eq!(cfg.alerts.default_expiry, Duration::from_secs(24 * 3600));
    assert!(!cfg.database.enable);
    assert!(cfg.metrics.listen.is_none());
    assert!(cfg.feeds.is_empty());
}

#[test]
fn sample_parses_sections_and_feeds() {
    let cfg = config::parse(SAMPLE).unwrap();
    assert_eq!(cfg.logging.level, "DEBUG");
    assert_eq!(cfg.supervisor.health_period, Duration::from_millis(500));
    assert_eq!(cfg.supervisor.restart_cooldown, Duration::from_secs(2));
    assert_eq!(cfg.scheduler.capacity, 200);
    assert_eq!(cfg.alerts.unresponsive_critical_after, Duration::from_secs(45));
    assert_eq!(cfg.alerts.default_expiry, Duration::from_secs(12 * 3600));

    assert_eq!(cfg.feeds.len(), 2);
    let dock = &cfg.feeds[0];
    assert_eq!(dock.priority, Priority::High);
    assert_eq!(dock.source.kind, SourceKind::Rtsp);
    assert_eq!(dock.models.len(), 2);
    assert_eq!(dock.active_models().count(), 1);
    assert!(matches!(&dock.models[0].kind, ModelKind::ObjectDetection(p) if p.classes.len() == 2));

    let gate = &cfg.feeds[1];
    assert_eq!(gate.priority, Priority::Medium);
    assert!(gate.enabled);
    assert_eq!(gate.resolution.width, 1280);
}

#[test]
fn bad_duration_is_reported() {
    let err = config::parse("[supervisor]\nstale_threshold = \"soon\"\n").unwrap_err();
    assert!(matches!(err, ConfigError::Toml(_)));
    assert!(err.to_string().contains("soon"));
}

#[test]
fn watermark_above_capacity_is_rejected() {
    let err = config::parse("[scheduler]\ncapacity = 10\nbacklog_watermark = 20\n").unwrap_err();
    assert!(matches!(err, ConfigError::Invalid { ref field, .. } if field == "scheduler.backlog_watermark"));
}

#[test]
fn critical_threshold_must_exceed_stale_threshold() {
    let txt = "[supervisor]\nstale_threshold = \"40s\"\n[alerts]\nunresponsive_critical_after = \"30s\"\n";
    assert!(matches!(config::parse(txt), Err(ConfigError::Invalid { .. })));
}

#[test]
fn zero_fps_feed_is_rejected() {
    let txt = r#"
[[feeds]]
id = "broken"
fps = 0
source = { kind = "file", address = "/srv/clip.mp4" }
"#;
    let err = config::parse(txt).unwrap_err();
    assert!(matches!(err, ConfigError::Invalid { ref field, .. } if field == "feeds.broken"));
}

#[test]
fn duplicate_feed_ids_are_rejected() {
    let feed = "[[feeds]]\nid = \"a\"\nfps = 1.0\nsource = { kind = \"device\", address = \"/dev/video0\" }\n";
    let err = config::parse(&format!("{feed}{feed}")).unwrap_err();
    assert!(err.to_string().contains("duplicate"));
}

#[test]
fn load_reads_from_disk() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(SAMPLE.as_bytes()).unwrap();
    let cfg = config::load(file.path()).unwrap();
    assert_eq!(cfg.feeds.len(), 2);

    let missing = config::load(std::path::Path::new("/nonexistent/feedwatch.toml"));
    assert!(matches!(missing, Err(ConfigError::Io(_))));
}
