//! jakolahd - JakOlah pipeline daemon
//!
//! This daemon:
//! 1. Serves the facility search API over HTTP
//! 2. Drives the frame scheduler against the configured frame source
//! 3. Folds every classification outcome into the session accumulator
//! 4. Logs a session summary on a fixed cadence and at shutdown

use anyhow::{anyhow, Result};
use clap::{Parser, ValueEnum};
use rand::Rng;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use jakolah_core::api::{ApiConfig, ApiServer};
use jakolah_core::{
    AppConfig, DirectorySource, FrameScheduler, FrameSource, HttpClassifier, SchedulerConfig,
    SearchEngine, SqliteFacilityStore, StubSource,
};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum SourceKind {
    /// Synthetic frames, for dry runs without a camera.
    Stub,
    /// Cycle through image files in --frames-dir.
    Dir,
}

#[derive(Parser, Debug)]
#[command(name = "jakolahd", about = "JakOlah classification pipeline daemon")]
struct Args {
    #[arg(long, value_enum, default_value = "stub")]
    source: SourceKind,

    /// Directory of frames for --source dir.
    #[arg(long)]
    frames_dir: Option<PathBuf>,

    /// How often to log the session summary, in seconds.
    #[arg(long, default_value_t = 10)]
    summary_interval_secs: u64,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let cfg = AppConfig::load()?;

    // Facility search API
    let store = SqliteFacilityStore::open(&cfg.db_path)?;
    let engine = SearchEngine::new(cfg.search.bounds)
        .with_defaults(cfg.search.default_radius_m, cfg.search.default_limit);
    let api_handle = ApiServer::new(
        ApiConfig {
            addr: cfg.api_addr.clone(),
        },
        engine,
        Box::new(store),
    )
    .spawn()?;
    log::info!("facility api listening on {}", api_handle.addr);

    // Classification pipeline
    let source: Box<dyn FrameSource> = match args.source {
        SourceKind::Stub => Box::new(StubSource::new()),
        SourceKind::Dir => {
            let dir = args
                .frames_dir
                .ok_or_else(|| anyhow!("--frames-dir is required with --source dir"))?;
            Box::new(DirectorySource::open(&dir)?)
        }
    };
    let classifier = Arc::new(
        HttpClassifier::new(&cfg.classify.base_url)
            .with_timeout(cfg.classify.request_timeout)
            .with_max_image_bytes(cfg.classify.max_image_bytes),
    );
    let session_id = new_session_id();
    let scheduler_cfg =
        SchedulerConfig::new(&session_id).with_tick_interval(cfg.classify.frame_interval);
    let scheduler = FrameScheduler::new(scheduler_cfg, source, classifier).spawn()?;

    log::info!(
        "jakolahd running. session={} classify={} interval={}ms",
        session_id,
        cfg.classify.base_url,
        cfg.classify.frame_interval.as_millis()
    );

    let running = Arc::new(AtomicBool::new(true));
    let running_handler = running.clone();
    ctrlc::set_handler(move || {
        running_handler.store(false, Ordering::SeqCst);
    })?;

    let summary_interval = Duration::from_secs(args.summary_interval_secs.max(1));
    let mut last_summary = std::time::Instant::now();
    while running.load(Ordering::SeqCst) {
        // Short sleeps keep Ctrl-C responsive between summary logs.
        std::thread::sleep(Duration::from_millis(200));
        if last_summary.elapsed() >= summary_interval {
            last_summary = std::time::Instant::now();
            let summary = scheduler.summary()?;
            let stats = scheduler.stats();
            log::info!(
                "session {}: attempts={} success_rate={:.1}% ticks={} skipped_busy={} misses={}",
                summary.session_id,
                summary.total_attempts,
                summary.success_rate_percent,
                stats.ticks,
                stats.skipped_busy,
                stats.capture_misses
            );
        }
    }

    log::info!("shutting down");
    let session = scheduler.stop()?;
    let final_summary = session.summary(jakolah_core::now_ms()?);
    log::info!(
        "final session {}: attempts={} success_rate={:.1}% categories={:?}",
        final_summary.session_id,
        final_summary.total_attempts,
        final_summary.success_rate_percent,
        final_summary.category_counts
    );
    api_handle.stop()?;
    Ok(())
}

fn new_session_id() -> String {
    let suffix: u64 = rand::thread_rng().gen();
    format!("sess-{:016x}", suffix)
}
