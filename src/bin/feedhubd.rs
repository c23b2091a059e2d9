//! feedhubd - multi-source capture daemon.
//!
//! The consumption loop of the system:
//! 1. Builds a capture backend, discovery adapter, and manager from config
//! 2. Starts every configured/discovered source
//! 3. Polls the latest frame of each active source at its own cadence,
//!    piping frames through the annotator
//! 4. Logs per-source health periodically
//! 5. Reconciles on demand: when no source is active, and on the configured
//!    operator interval
//! 6. Stops everything on Ctrl-C

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use feedhub::{
    accel, compose_grid, Annotator, CaptureBackend, CaptureManager, DiscoveryAdapter,
    FeedhubConfig, FsDiscovery, PassthroughAnnotator, SourceId, SourceRegistry, StaticDiscovery,
    StubBackend, StubPlan, SystemBackend,
};

const HEALTH_LOG_INTERVAL: Duration = Duration::from_secs(5);
/// Floor between emergency reconciles when nothing is active.
const RECONCILE_BACKOFF: Duration = Duration::from_secs(1);
const GRID_COLS: usize = 2;
const GRID_CELL_WIDTH: u32 = 320;
const GRID_CELL_HEIGHT: u32 = 240;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Serve synthetic frames instead of opening real devices/files.
    #[arg(long)]
    stub: bool,
    /// Override the media folder scanned by discovery.
    #[arg(long)]
    video_dir: Option<PathBuf>,
    /// Write the latest composed grid as raw RGB24 to this path on every
    /// health tick (overwritten in place).
    #[arg(long)]
    snapshot: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let mut cfg = FeedhubConfig::load()?;
    if let Some(dir) = &args.video_dir {
        cfg.video_dir = dir.clone();
    }

    // Encode capability is negotiated once here, never inside workers.
    let vendor = accel::detect_gpu_vendor();
    log::info!(
        "gpu vendor={} preferred codec={}",
        vendor.as_str(),
        accel::preferred_codec(vendor)
    );

    let manager = build_manager(&cfg, args.stub);

    let started = manager.start_all().context("starting capture sources")?;
    log::info!(
        "feedhubd running: {} of {} sources started",
        started,
        manager.registry().len()
    );

    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = Arc::clone(&shutdown);
        ctrlc::set_handler(move || shutdown.store(true, Ordering::SeqCst))
            .context("installing shutdown handler")?;
    }

    run_consumption_loop(&manager, &cfg, &args, &shutdown);

    manager.stop_all();
    log::info!("feedhubd stopped");
    Ok(())
}

fn build_manager(cfg: &FeedhubConfig, stub: bool) -> CaptureManager {
    if stub {
        // Synthetic mode: every configured source (or one default camera)
        // streams generated frames forever.
        let sources = if cfg.sources.is_empty() {
            vec![SourceId::Device(0)]
        } else {
            cfg.sources.clone()
        };
        let backend = StubBackend::new();
        for id in &sources {
            backend.set_plan(id.clone(), StubPlan::endless(cfg.capture.target_fps as f64));
        }
        let backend: Arc<dyn CaptureBackend> = Arc::new(backend);
        let registry = SourceRegistry::with_sources(Arc::clone(&backend), sources.clone());
        return CaptureManager::new(registry, Box::new(StaticDiscovery::new(sources)));
    }

    let backend: Arc<dyn CaptureBackend> = Arc::new(SystemBackend::new(cfg.capture));
    let discovery = FsDiscovery::new(
        Arc::clone(&backend),
        cfg.video_dir.clone(),
        cfg.extension.clone(),
        cfg.max_devices,
    );
    let initial = if cfg.sources.is_empty() {
        discovery.list_sources()
    } else {
        cfg.sources.clone()
    };
    let registry = SourceRegistry::with_sources(backend, initial);
    CaptureManager::new(registry, Box::new(discovery))
}

fn run_consumption_loop(
    manager: &CaptureManager,
    cfg: &FeedhubConfig,
    args: &Args,
    shutdown: &AtomicBool,
) {
    let mut annotator = PassthroughAnnotator;
    let mut last_health_log = Instant::now();
    let mut last_reconcile = Instant::now();

    while !shutdown.load(Ordering::SeqCst) {
        let active = manager.active_sources();

        let mut frames = Vec::with_capacity(active.len());
        for worker in &active {
            if let Some(frame) = worker.read() {
                frames.push(annotator.annotate(&frame));
            }
        }

        let health_due = last_health_log.elapsed() >= HEALTH_LOG_INTERVAL;
        if health_due {
            for worker in manager.registry().snapshot() {
                let stats = worker.stats();
                log::info!(
                    "[{}] state={:?} frames={} fps={:.1}",
                    stats.name,
                    stats.state,
                    stats.frames_captured,
                    stats.nominal_fps
                );
            }
            let in_flight: usize = frames.iter().map(|frame| frame.byte_len()).sum();
            log::debug!(
                "{} frames in flight, ~{} KB",
                frames.len(),
                in_flight / 1024
            );
            if let Some(path) = &args.snapshot {
                write_snapshot(path, &frames);
            }
            last_health_log = Instant::now();
        }

        let interval_due = cfg
            .reconcile_interval
            .map(|interval| last_reconcile.elapsed() >= interval)
            .unwrap_or(false);
        let starved = active.is_empty() && last_reconcile.elapsed() >= RECONCILE_BACKOFF;
        if interval_due || starved {
            let stats = manager.reconcile();
            log::info!(
                "reconcile: discovered={} added={} revived={} still_dead={}",
                stats.discovered,
                stats.added,
                stats.revived,
                stats.still_dead
            );
            last_reconcile = Instant::now();
        }

        std::thread::sleep(cfg.poll_interval);
    }
}

/// Persisting snapshots is this presentation layer's job, not the core's.
/// Raw RGB24, overwritten in place: last write wins here too.
fn write_snapshot(path: &std::path::Path, frames: &[feedhub::Frame]) {
    let Some(grid) = compose_grid(frames, GRID_COLS, GRID_CELL_WIDTH, GRID_CELL_HEIGHT) else {
        return;
    };
    if let Err(err) = std::fs::write(path, &grid.data) {
        log::warn!("failed to write snapshot {}: {}", path.display(), err);
    } else {
        log::debug!(
            "snapshot {} ({}x{})",
            path.display(),
            grid.width,
            grid.height
        );
    }
}
