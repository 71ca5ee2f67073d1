//! ar_detectd - headless AR detection daemon
//!
//! This daemon:
//! 1. Loads configuration (AR_DETECT_CONFIG + AR_DETECT_* overrides)
//! 2. Opens the configured camera and detector backend
//! 3. Runs the detection loop until Ctrl-C or a detector failure
//! 4. Logs every history entry as it is recorded
//! 5. Optionally uploads the final history to the log server

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::{Duration, Instant};

use ar_detect::history::format_item;
use ar_detect::{
    upload_history, AppConfig, BackendRegistry, CameraSource, DetectionLoop, FramePipeline,
    RecordingSurface,
};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Post the history to the log server on shutdown.
    #[arg(long, env = "AR_DETECT_UPLOAD")]
    upload: bool,
    /// Stop after this many processed frames.
    #[arg(long)]
    max_frames: Option<u64>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = AppConfig::load()?;

    let mut registry = BackendRegistry::from_settings(&config.detector, &config.camera)?;
    let backend = registry.take_default()?;
    log::info!(
        "detector backend: {} (timeout {:?})",
        backend.name(),
        config.detector.timeout
    );

    let source = CameraSource::new(config.camera.clone())?;
    let pipeline = FramePipeline::new(backend, config.pipeline_settings(), RecordingSurface::new())?;
    let handle = DetectionLoop::spawn(pipeline, source, config.detector.tick)?;
    log::info!(
        "ar_detectd running. camera={} {}x{} overlay={}",
        config.camera.url,
        config.camera.width,
        config.camera.height,
        if config.show_overlay { "on" } else { "off" }
    );

    let (shutdown_tx, shutdown_rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = shutdown_tx.send(());
    })
    .context("error setting Ctrl-C handler")?;

    let mut processed = 0u64;
    let mut last_health_log = Instant::now();
    loop {
        if shutdown_rx.try_recv().is_ok() {
            log::info!("shutdown signal received, stopping detection loop...");
            break;
        }
        match handle.reports().recv_timeout(Duration::from_millis(200)) {
            Ok(report) => {
                processed += 1;
                if let Some(entry) = &report.history_entry {
                    let items: Vec<String> = entry.items.iter().map(format_item).collect();
                    log::info!("[{}] {}", entry.timestamp, items.join(", "));
                }
                if args.max_frames.is_some_and(|max| processed >= max) {
                    log::info!("processed {} frames, stopping", processed);
                    break;
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                if !handle.is_running() {
                    break;
                }
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
        if last_health_log.elapsed() >= Duration::from_secs(5) {
            log::info!("frames processed: {}", processed);
            last_health_log = Instant::now();
        }
    }

    let exit = handle.stop()?;
    let history = exit.pipeline.history();
    log::info!("history holds {} entries", history.len());

    if args.upload && !history.is_empty() {
        match upload_history(&config.log_server.addr, &history) {
            Ok(receipt) => log::info!("history uploaded as {}", receipt.file),
            Err(err) => log::error!("history upload failed: {:#}", err),
        }
    }

    match exit.error {
        Some(err) => Err(anyhow!("detection loop failed: {:#}", err)),
        None => Ok(()),
    }
}
