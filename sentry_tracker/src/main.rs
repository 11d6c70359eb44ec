//! Sentry tracker - follows a red target and streams motion commands
//!
//! Main entry point for the CLI application.

mod config;
mod source;

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use anyhow::Context;
use clap::Parser;
use tokio::sync::broadcast::error::RecvError;
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use sentry_server::ServerEvent;
use sentry_vision::TrackingPipeline;
use sentry_vision::pipeline::Dispatch;

use crate::config::Config;
use crate::source::{FrameSource, ImageSequence, SyntheticTarget};

/// Sentry tracker - visual pan/tilt targeting over WebSocket
#[derive(Parser, Debug)]
#[command(name = "sentry_tracker", version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// WebSocket server port (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Centering deadzone in pixels (overrides config)
    #[arg(long)]
    deadzone: Option<i32>,

    /// Minimum target area in pixels (overrides config)
    #[arg(long)]
    min_area: Option<u64>,

    /// MOVE_DIR speed (overrides config)
    #[arg(long)]
    speed: Option<u8>,

    /// Directory of PNG/JPEG frames to loop over
    #[arg(long, conflicts_with = "synthetic")]
    frames: Option<PathBuf>,

    /// Use a generated scene with a moving red disc
    #[arg(long)]
    synthetic: bool,

    /// Stop after this many cycles
    #[arg(long)]
    cycles: Option<u64>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn apply_overrides(config: &mut Config, args: &Args) {
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(deadzone) = args.deadzone {
        config.vision.tracking.deadzone = deadzone;
    }
    if let Some(min_area) = args.min_area {
        config.vision.tracking.min_area = min_area;
    }
    if let Some(speed) = args.speed {
        config.vision.dispatch.speed = speed;
    }
    if let Some(dir) = &args.frames {
        config.capture.frames_dir = Some(dir.clone());
    }
    if args.synthetic {
        config.capture.frames_dir = None;
    }
    if let Ok(host) = std::env::var("SENTRY_BIND") {
        if !host.is_empty() {
            config.server.host = host;
        }
    }
}

fn open_source(config: &Config) -> anyhow::Result<Box<dyn FrameSource>> {
    match &config.capture.frames_dir {
        Some(dir) => {
            let sequence = ImageSequence::open(dir)?;
            info!(frames = sequence.len(), dir = %dir.display(), "Loaded frame sequence");
            Ok(Box::new(sequence))
        }
        None => {
            info!(
                width = config.capture.width,
                height = config.capture.height,
                "Using synthetic target scene"
            );
            Ok(Box::new(SyntheticTarget::new(
                config.capture.width,
                config.capture.height,
            )))
        }
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(log_level.into())
                .from_env_lossy(),
        )
        .init();

    info!("Starting sentry_tracker v{}", env!("CARGO_PKG_VERSION"));

    let mut config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::load()?,
    };
    apply_overrides(&mut config, &args);
    config.validate()?;

    let mut source = open_source(&config)?;
    let server = sentry_server::spawn(config.server.clone()).context("Failed to start server")?;

    let mut events = server.subscribe();
    server.runtime().spawn(async move {
        loop {
            match events.recv().await {
                // Drops and per-command traffic are already logged by the server.
                Ok(ServerEvent::CommandDropped { .. } | ServerEvent::CommandSent { .. }) => {}
                Ok(event) => info!("{event}"),
                Err(RecvError::Lagged(missed)) => warn!(missed, "event log fell behind"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    let running = Arc::new(AtomicBool::new(true));
    let signal_flag = Arc::clone(&running);
    server.runtime().spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received");
            signal_flag.store(false, Ordering::SeqCst);
        }
    });

    let sink = server.sender();
    let mut pipeline = TrackingPipeline::new(&config.vision);
    let cadence = config.capture.cadence();
    let mut cycles: u64 = 0;
    let mut last_status = String::new();

    while running.load(Ordering::SeqCst) {
        let started = Instant::now();
        let frame = match source.next_frame() {
            Ok(frame) => frame,
            Err(err) => {
                error!("Failed to grab frame: {err:#}");
                break;
            }
        };

        let report = pipeline.process_frame(&frame, started, &sink);
        let status = report.guidance.to_string();
        if status != last_status {
            info!(candidates = report.candidates.len(), "{status}");
            last_status = status;
        }
        if let Dispatch::Failed { id, error } = &report.dispatch {
            debug!(%id, %error, "cycle continued after failed handoff");
        }

        cycles += 1;
        if args.cycles.is_some_and(|max| cycles >= max) {
            break;
        }

        let elapsed = started.elapsed();
        if elapsed < cadence {
            std::thread::sleep(cadence - elapsed);
        }
    }

    info!(cycles, "Capture loop stopped");
    server.shutdown()?;
    info!("sentry_tracker stopped");
    Ok(())
}
