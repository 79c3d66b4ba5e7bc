//! detect_image - Submit a single image to a detection service and print the result.
//!
//! Exits non-zero when the image cannot be read or the service call fails.

use anyhow::{anyhow, Result};
use clap::Parser;
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;

use rtod_client::ingest::still::load_rgb;
use rtod_client::{service_for_url, ClientConfig, Detection, Frame};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Detect objects in one image using a remote detection service"
)]
struct Args {
    /// Image to submit (JPEG or PNG).
    image: PathBuf,

    /// Detection service base URL.
    #[arg(long)]
    backend_url: Option<String>,

    /// Minimum confidence (exclusive) for a class to be listed as observed.
    #[arg(long)]
    confidence_threshold: Option<f32>,

    /// JPEG quality 1..=100.
    #[arg(long)]
    jpeg_quality: Option<u8>,

    /// Per-request timeout.
    #[arg(long)]
    request_timeout_ms: Option<u64>,

    /// Print the reply as JSON.
    #[arg(long)]
    json: bool,
}

#[derive(Serialize)]
struct Report<'a> {
    image: String,
    width: u32,
    height: u32,
    detections: &'a [Detection],
    classes: Vec<&'a str>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();

    let mut cfg = ClientConfig::load()?;
    if let Some(url) = args.backend_url {
        cfg.session.backend_url = url;
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
    cfg.validate()?;

    let image = load_rgb(&args.image)?;
    let frame = Frame::encode(&image, cfg.session.jpeg_quality, 0)
        .map_err(|e| anyhow!("{}: {}", args.image.display(), e))?;
    let service = service_for_url(&cfg.session.backend_url, cfg.session.request_timeout)?;
    let batch = service
        .detect(&frame)
        .map_err(|e| anyhow!("detection failed: {}", e))?;

    let mut classes: Vec<&str> = batch
        .above(cfg.session.confidence_threshold)
        .map(|det| det.class())
        .collect();
    classes.sort_unstable();
    classes.dedup();

    if args.json {
        let report = Report {
            image: args.image.display().to_string(),
            width: frame.width,
            height: frame.height,
            detections: &batch.detections,
            classes,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!(
        "{} ({}x{}): {} detection(s)",
        args.image.display(),
        frame.width,
        frame.height,
        batch.len()
    );
    for det in batch.iter() {
        let [x1, y1, x2, y2] = det.bbox();
        println!(
            "  {:<16} box=[{:.0}, {:.0}, {:.0}, {:.0}]",
            det.label(),
            x1,
            y1,
            x2,
            y2
        );
    }
    if !classes.is_empty() {
        println!("classes: {}", classes.join(", "));
    }
    Ok(())
}
