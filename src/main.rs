// src/main.rs

//! Service entry-point.
//!
//! 1. Load configuration & set up structured logging
//! 2. Start the Prometheus exporter when `[metrics] listen` is set
//! 3. Open the SQLite archive and spawn its writers when enabled
//! 4. Spawn the alert engine, the scheduler and the supervisor
//! 5. Start every enabled feed, wait for Ctrl-C, then shut down cleanly

// ───── std / 3rd-party imports ──────────────────────────────────────────────
use anyhow::{Context, Result};
use chrono::Local;
use fern::Dispatch;
use futures::future::join_all;
use log::LevelFilter;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::{
    path::{Path, PathBuf},
    process,
    sync::Arc,
    thread,
};
use tokio::runtime::Runtime;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

// ───── local imports ────────────────────────────────────────────────────────
use feedwatch::alerts::AlertEngine;
use feedwatch::config::{self, Config, LoggingConfig};
use feedwatch::db::{self, connection, maintenance};
use feedwatch::model::FeedId;
use feedwatch::scheduler::{JobScheduler, SimulatedAnalyzer};
use feedwatch::store::{ArchiveSinks, ArchivedStore, FeedStore, MemoryStore};
use feedwatch::supervisor::WorkerSupervisor;
use feedwatch::worker::SimulatedSource;

const DEFAULT_CONFIG: &str = "feedwatch.toml";

// ───── helpers ──────────────────────────────────────────────────────────────

/// Config file from the first CLI argument, else `feedwatch.toml` in the
/// working directory.
fn config_path() -> (PathBuf, bool) {
    match std::env::args_os().nth(1) {
        Some(p) => (PathBuf::from(p), true),
        None => (PathBuf::from(DEFAULT_CONFIG), false),
    }
}

/// An explicitly named config must exist; the default one may be absent.
fn load_config(path: &Path, explicit: bool) -> Result<Config> {
    if !explicit && !path.exists() {
        eprintln!(
            "[{}][WARN][main] {} not found, running with defaults",
            Local::now().to_rfc3339(),
            path.display()
        );
        return Ok(Config::default());
    }
    config::load(path).with_context(|| format!("loading {}", path.display()))
}

/// Configure global logging as requested in `[logging]`.
fn setup_logging(base_dir: &Path, logging: &LoggingConfig) -> Result<(), fern::InitError> {
    let level = match logging.level.to_uppercase().as_str() {
        "ERROR" => LevelFilter::Error,
        "WARN" => LevelFilter::Warn,
        "DEBUG" => LevelFilter::Debug,
        "TRACE" => LevelFilter::Trace,
        _ => LevelFilter::Info,
    };

    let log_path = logging
        .enable
        .then(|| base_dir.join(logging.file.as_deref().unwrap_or("feedwatch.log")));

    let mut dispatch = Dispatch::new()
        .format(|out, msg, record| {
            out.finish(format_args!(
                "[{}][{:5}][{}][pid={}][tid={:?}] {}",
                Local::now().to_rfc3339(),
                record.level(),
                record.target(),
                process::id(),
                thread::current().id(),
                msg
            ))
        })
        .level(level)
        .chain(std::io::stdout());

    if let Some(path) = log_path {
        dispatch = dispatch.chain(fern::log_file(path)?);
    }

    dispatch.apply()?;
    Ok(())
}

/// Open the archive and spawn one writer per record stream. Returns the
/// decorated store plus the writer and TTL tasks.
fn open_archive(
    base_dir: &Path,
    cfg: &Config,
    memory: Arc<MemoryStore>,
    shutdown: CancellationToken,
) -> Result<(Arc<dyn FeedStore>, Vec<JoinHandle<()>>)> {
    let db = &cfg.database;
    let path = connection::db_path(base_dir, db);
    let conn_outcomes = connection::init_database(base_dir, db).context("initialising archive")?;
    let conn_alerts = connection::open_db_connection(&path, db).context("opening archive")?;

    let (outcomes_tx, outcomes_rx) = mpsc::channel(db.queue_capacity.max(1));
    let (alerts_tx, alerts_rx) = mpsc::channel(db.queue_capacity.max(1));

    let mut tasks = vec![
        db::spawn_writer(conn_outcomes, outcomes_rx, db),
        db::spawn_writer(conn_alerts, alerts_rx, db),
    ];
    tasks.extend(maintenance::spawn_ttl_cleanup(path, db, shutdown));

    let store = ArchivedStore::new(memory, ArchiveSinks { outcomes: outcomes_tx, alerts: alerts_tx });
    Ok((Arc::new(store), tasks))
}

// ───── service logic ────────────────────────────────────────────────────────

async fn run(cfg: Config, base_dir: PathBuf) -> Result<()> {
    if let Some(addr) = cfg.metrics.listen {
        PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .context("installing Prometheus exporter")?;
        log::info!("Metrics exporter listening on {}", addr);
    }

    let shutdown = CancellationToken::new();
    let memory = Arc::new(MemoryStore::with_feeds(cfg.feeds.iter().cloned()));

    // Archive writers stop once every sender is dropped, so they get their
    // own list and are awaited after everything else.
    let (store, archive_tasks): (Arc<dyn FeedStore>, Vec<JoinHandle<()>>) = if cfg.database.enable {
        open_archive(&base_dir, &cfg, memory.clone(), shutdown.clone())?
    } else {
        (memory.clone() as Arc<dyn FeedStore>, Vec::new())
    };

    let (alerts, mut tasks) =
        AlertEngine::new(store.clone(), cfg.alerts.clone()).spawn(shutdown.clone());

    let scheduler = JobScheduler::new(
        cfg.scheduler.clone(),
        Arc::new(SimulatedAnalyzer::new()),
        store.clone(),
        alerts.clone(),
    );
    tasks.push(scheduler.spawn(shutdown.clone()));

    let (supervisor, sup_tasks) = WorkerSupervisor::spawn(
        cfg.supervisor.clone(),
        store.clone(),
        scheduler.clone(),
        alerts.clone(),
        Arc::new(SimulatedSource),
        shutdown.clone(),
    );
    tasks.extend(sup_tasks);

    let enabled: Vec<FeedId> = cfg.feeds.iter().filter(|f| f.enabled).map(|f| f.id.clone()).collect();
    for id in &enabled {
        if let Err(e) = supervisor.start_feed(id).await {
            log::error!("Feed {} failed to start: {}", id, e);
        }
    }
    log::info!(
        "Service running with {} of {} feed(s)",
        supervisor.active_feeds().len(),
        cfg.feeds.len()
    );

    tokio::signal::ctrl_c().await.context("waiting for Ctrl-C")?;
    log::warn!("Shutdown initiated");

    let stopped = supervisor.stop_all().await;
    shutdown.cancel();
    join_all(tasks).await;

    let stats = scheduler.stats();
    log::info!(
        "Stopped {} feed(s); jobs submitted={} executed={} rejected={} dropped={}",
        stopped,
        stats.submitted,
        stats.executed,
        stats.rejected,
        stats.dropped
    );

    // Release every archive sender, then let the writers flush.
    drop((supervisor, scheduler, alerts, store));
    join_all(archive_tasks).await;
    log::info!("Service stopped cleanly");
    Ok(())
}

fn main() -> Result<()> {
    // 1 ─ Context
    let (path, explicit) = config_path();
    let base_dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    let cfg = load_config(&path, explicit)?;

    // 2 ─ Logging
    setup_logging(&base_dir, &cfg.logging).context("logging setup failed")?;
    log::info!("Service bootstrap initiated ({})", path.display());

    // 3 ─ Runtime
    let rt = Runtime::new().context("Tokio runtime creation failed")?;
    rt.block_on(run(cfg, base_dir))
}
