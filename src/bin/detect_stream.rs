//! detect_stream - Capture frames on a fixed cadence and stream them to a detection service.
//!
//! 1. Loads `DETECT_CONFIG` + `DETECT_*` overrides, then applies command-line flags
//! 2. Optionally checks `GET {base}/status` before capturing
//! 3. Runs the frame producer until Ctrl-C (or `--run-for-secs`)
//! 4. Logs session statistics every few seconds and once on shutdown

use anyhow::{anyhow, Context, Result};
use clap::{Parser, ValueEnum};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rtod_client::{
    open_source, service_for_url, CadenceProfile, ClientConfig, EnvLogSink, JsonLinesRenderer,
    LogRenderer, Producer, Renderer,
};

const STATS_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Clone, Copy, Debug, ValueEnum)]
enum OutputFormat {
    Log,
    Json,
}

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Stream camera frames to a remote object detection service"
)]
struct Args {
    /// Detection service base URL (`stub://` runs an in-process stub).
    #[arg(long)]
    backend_url: Option<String>,

    /// Frame source: stub://name, http(s):// camera URL, or an image path.
    #[arg(long)]
    source: Option<String>,

    /// Cadence profile: live (200 ms) or upload (1000 ms).
    #[arg(long)]
    profile: Option<String>,

    /// Explicit capture interval; overrides the profile.
    #[arg(long)]
    interval_ms: Option<u64>,

    /// Minimum confidence (exclusive) for a class to enter the unique-class set.
    #[arg(long)]
    confidence_threshold: Option<f32>,

    /// JPEG quality 1..=100.
    #[arg(long)]
    jpeg_quality: Option<u8>,

    /// Per-request timeout. Unset means no client-side timeout.
    #[arg(long)]
    request_timeout_ms: Option<u64>,

    /// Offer a still image on every tick instead of once.
    #[arg(long, env = "DETECT_REPEAT_STILL")]
    repeat_still: bool,

    /// Query the service status endpoint and refuse to start if the model is not loaded.
    #[arg(long, env = "DETECT_CHECK_STATUS")]
    check_status: bool,

    /// How detections are emitted.
    #[arg(long, value_enum, default_value = "log")]
    output: OutputFormat,

    /// Stop automatically after this many seconds.
    #[arg(long)]
    run_for_secs: Option<u64>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut cfg = ClientConfig::load()?;
    apply_args(&mut cfg, &args)?;
    cfg.validate()?;

    log::info!("detect_stream starting");
    log::info!("  backend: {}", cfg.session.backend_url);
    log::info!("  source: {}", cfg.source);
    log::info!(
        "  cadence: {:?} ({}ms)",
        cfg.profile,
        cfg.session.interval.as_millis()
    );
    log::info!("  confidence threshold: {}", cfg.session.confidence_threshold);

    let service = service_for_url(&cfg.session.backend_url, cfg.session.request_timeout)?;
    if args.check_status {
        let status = service
            .status()
            .map_err(|e| anyhow!("status check failed: {}", e))?;
        log::info!(
            "service status: {} (model_loaded={}, device={})",
            status.status,
            status.model_loaded,
            if status.model_device.is_empty() {
                "unknown"
            } else {
                status.model_device.as_str()
            }
        );
        if !status.is_ready() {
            return Err(anyhow!("detection service not ready: {}", status.message));
        }
    }

    let renderer: Arc<dyn Renderer> = match args.output {
        OutputFormat::Log => Arc::new(LogRenderer),
        OutputFormat::Json => Arc::new(JsonLinesRenderer::new(std::io::stdout())),
    };
    let source = open_source(&cfg.source, args.repeat_still)?;
    let mut producer = Producer::with_service(
        cfg.session.clone(),
        source,
        service,
        renderer,
        Arc::new(EnvLogSink),
    );
    producer
        .start()
        .map_err(|e| anyhow!("failed to start capture: {}", e))?;

    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })
    .context("error setting Ctrl-C handler")?;

    let deadline = args
        .run_for_secs
        .map(|secs| Instant::now() + Duration::from_secs(secs));
    loop {
        let wait = match deadline {
            Some(deadline) => {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    log::info!("run time elapsed");
                    break;
                }
                remaining.min(STATS_INTERVAL)
            }
            None => STATS_INTERVAL,
        };
        match rx.recv_timeout(wait) {
            Ok(()) => {
                log::info!("shutdown signal received");
                break;
            }
            Err(RecvTimeoutError::Timeout) => log_stats(&producer),
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    producer.stop()?;
    log_stats(&producer);
    Ok(())
}

fn apply_args(cfg: &mut ClientConfig, args: &Args) -> Result<()> {
    if let Some(url) = &args.backend_url {
        cfg.session.backend_url = url.clone();
    }
    if let Some(source) = &args.source {
        cfg.source = source.clone();
    }
    if let Some(profile) = &args.profile {
        cfg.set_profile(CadenceProfile::parse(profile)?);
    }
    if let Some(millis) = args.interval_ms {
        cfg.session.interval = Duration::from_millis(millis);
    }
    if let Some(threshold) = args.confidence_threshold {
        cfg.session.confidence_threshold = threshold;
    }
    if let Some(quality) = args.jpeg_quality {
        cfg.session.jpeg_quality = quality;
    }
    if let Some(millis) = args.request_timeout_ms {
        cfg.session.request_timeout = Some(Duration::from_millis(millis));
    }
    Ok(())
}

fn log_stats<S: rtod_client::FrameSource + 'static>(producer: &Producer<S>) {
    let stats = producer.stats();
    log::info!(
        "stats: state={:?} submitted={} skipped={} applied={} detections={} errors(capture={}, encode={}, transport={}, backend={})",
        producer.state(),
        stats.frames_submitted,
        stats.ticks_skipped,
        stats.batches_applied,
        stats.detections_applied,
        stats.capture_failures,
        stats.encode_failures,
        stats.transport_errors,
        stats.backend_errors
    );
    let classes = producer.seen_classes();
    if !classes.is_empty() {
        log::info!("classes seen: {}", classes.join(", "));
    }
}
