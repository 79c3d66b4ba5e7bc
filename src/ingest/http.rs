//! HTTP camera source.
//!
//! This module provides `HttpCameraSource` for cameras that serve frames over HTTP:
//! - `multipart/x-mixed-replace` MJPEG streams (read continuously on a background
//!   thread; only the latest complete JPEG is kept)
//! - single JPEG snapshots (one GET per tick)
//!
//! The source decodes JPEG to RGB in memory. It never writes frames to disk and never
//! holds more than one pending frame.

use std::io::Read;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use image::RgbImage;
use url::Url;

use super::{FrameSource, SourceStats};

const MAX_JPEG_BYTES: usize = 5 * 1024 * 1024;

/// Configuration for an HTTP camera source.
#[derive(Clone, Debug)]
pub struct HttpCameraConfig {
    /// Stream or snapshot URL.
    pub url: String,
}

impl Default for HttpCameraConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:81/stream".to_string(),
        }
    }
}

pub struct HttpCameraSource {
    config: HttpCameraConfig,
    mode: Option<CameraMode>,
    connected_at: Option<Instant>,
    last_frame_at: Option<Instant>,
    frame_count: u64,
}

enum CameraMode {
    Mjpeg(MjpegReader),
    Snapshot,
}

impl HttpCameraSource {
    pub fn new(config: HttpCameraConfig) -> Result<Self> {
        let url = Url::parse(&config.url).context("parse camera url")?;
        match url.scheme() {
            "http" | "https" => {}
            other => {
                return Err(anyhow!(
                    "unsupported camera scheme '{}'; expected http(s)",
                    other
                ))
            }
        }
        Ok(Self {
            config,
            mode: None,
            connected_at: None,
            last_frame_at: None,
            frame_count: 0,
        })
    }
}

impl FrameSource for HttpCameraSource {
    fn describe(&self) -> String {
        self.config.url.clone()
    }

    fn connect(&mut self) -> Result<()> {
        let response = ureq::get(&self.config.url)
            .call()
            .with_context(|| format!("connect to camera {}", self.config.url))?;
        let content_type = response.header("Content-Type").unwrap_or("").to_lowercase();
        if content_type.contains("multipart") {
            log::info!("HttpCameraSource: MJPEG stream at {}", self.config.url);
            self.mode = Some(CameraMode::Mjpeg(MjpegReader::spawn(
                response.into_reader(),
            )));
        } else {
            log::info!("HttpCameraSource: snapshot mode at {}", self.config.url);
            self.mode = Some(CameraMode::Snapshot);
        }
        self.connected_at = Some(Instant::now());
        Ok(())
    }

    fn next_image(&mut self) -> Result<Option<RgbImage>> {
        let mode = self
            .mode
            .as_mut()
            .ok_or_else(|| anyhow!("camera source not connected; call connect() first"))?;
        let jpeg = match mode {
            CameraMode::Mjpeg(reader) => match reader.take_latest()? {
                Some(jpeg) => jpeg,
                None => return Ok(None),
            },
            CameraMode::Snapshot => fetch_single_jpeg(&self.config.url)?,
        };
        let image = decode_jpeg(&jpeg)?;
        self.frame_count += 1;
        self.last_frame_at = Some(Instant::now());
        Ok(Some(image))
    }

    fn is_healthy(&self) -> bool {
        let Some(connected_at) = self.connected_at else {
            return false;
        };
        if let Some(CameraMode::Mjpeg(reader)) = &self.mode {
            if reader.failed() {
                return false;
            }
        }
        let Some(last_frame_at) = self.last_frame_at else {
            return connected_at.elapsed() <= Duration::from_secs(5);
        };
        last_frame_at.elapsed() <= Duration::from_secs(5)
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            source: self.config.url.clone(),
        }
    }
}

/// Background MJPEG reader keeping only the newest complete JPEG.
struct MjpegReader {
    latest: Arc<Mutex<Option<Vec<u8>>>>,
    error: Arc<Mutex<Option<String>>>,
    shutdown: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl MjpegReader {
    fn spawn(reader: Box<dyn Read + Send + Sync + 'static>) -> Self {
        let latest = Arc::new(Mutex::new(None));
        let error = Arc::new(Mutex::new(None));
        let shutdown = Arc::new(AtomicBool::new(false));
        let (latest_thread, error_thread, shutdown_thread) =
            (latest.clone(), error.clone(), shutdown.clone());
        let join = std::thread::spawn(move || {
            let mut splitter = MjpegSplitter::new(reader);
            while !shutdown_thread.load(Ordering::SeqCst) {
                match splitter.read_next_jpeg() {
                    Ok(jpeg) => {
                        if let Ok(mut slot) = latest_thread.lock() {
                            *slot = Some(jpeg);
                        }
                    }
                    Err(e) => {
                        log::warn!("mjpeg reader stopped: {:#}", e);
                        if let Ok(mut slot) = error_thread.lock() {
                            *slot = Some(e.to_string());
                        }
                        break;
                    }
                }
            }
        });
        Self {
            latest,
            error,
            shutdown,
            join: Some(join),
        }
    }

    fn take_latest(&self) -> Result<Option<Vec<u8>>> {
        let frame = self
            .latest
            .lock()
            .map_err(|_| anyhow!("mjpeg frame slot poisoned"))?
            .take();
        if frame.is_none() {
            if let Some(err) = self.error.lock().ok().and_then(|e| e.clone()) {
                return Err(anyhow!("mjpeg stream failed: {}", err));
            }
        }
        Ok(frame)
    }

    fn failed(&self) -> bool {
        self.error.lock().map(|e| e.is_some()).unwrap_or(true)
    }
}

impl Drop for MjpegReader {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        // The reader thread may be parked in a blocking read; let it exit on its own.
        drop(self.join.take());
    }
}

/// Splits a byte stream on JPEG SOI/EOI markers.
///
/// The buffer never holds more than one partial frame of at most `max_frame` bytes.
/// Frames over the cap are skipped, not truncated.
struct MjpegSplitter<R: Read> {
    reader: R,
    buffer: Vec<u8>,
    max_frame: usize,
}

impl<R: Read> MjpegSplitter<R> {
    fn new(reader: R) -> Self {
        Self::with_max_frame(reader, MAX_JPEG_BYTES)
    }

    fn with_max_frame(reader: R, max_frame: usize) -> Self {
        Self {
            reader,
            buffer: Vec::with_capacity(64 * 1024),
            max_frame,
        }
    }

    fn read_next_jpeg(&mut self) -> Result<Vec<u8>> {
        let mut chunk = vec![0u8; 8192];
        loop {
            while let Some((start, end)) = find_jpeg_bounds(&self.buffer) {
                if end - start > self.max_frame {
                    log::warn!(
                        "mjpeg frame of {} bytes exceeds {} byte cap, skipped",
                        end - start,
                        self.max_frame
                    );
                    self.buffer.drain(..end);
                    continue;
                }
                let frame = self.buffer[start..end].to_vec();
                self.buffer.drain(..end);
                return Ok(frame);
            }
            self.discard_unusable();

            let read = self.reader.read(&mut chunk).context("read mjpeg chunk")?;
            if read == 0 {
                return Err(anyhow!("mjpeg stream ended"));
            }
            self.buffer.extend_from_slice(&chunk[..read]);
        }
    }

    /// Drop multipart framing before the next SOI, and a partial frame that has
    /// already outgrown the cap.
    fn discard_unusable(&mut self) {
        match self.buffer.windows(2).position(|w| w == [0xFF, 0xD8]) {
            Some(start) if self.buffer.len() - start > self.max_frame => {
                log::warn!(
                    "mjpeg frame exceeds {} byte cap, skipped",
                    self.max_frame
                );
                self.buffer.clear();
            }
            Some(start) => {
                self.buffer.drain(..start);
            }
            None => {
                // A trailing 0xFF may be the first half of an SOI.
                let keep = usize::from(self.buffer.last() == Some(&0xFF));
                let drain_len = self.buffer.len() - keep;
                self.buffer.drain(..drain_len);
            }
        }
    }
}

fn fetch_single_jpeg(url: &str) -> Result<Vec<u8>> {
    let response = ureq::get(url)
        .call()
        .with_context(|| format!("fetch jpeg snapshot from {}", url))?;
    let mut bytes = Vec::new();
    response
        .into_reader()
        .take(MAX_JPEG_BYTES as u64 + 1)
        .read_to_end(&mut bytes)
        .context("read jpeg snapshot")?;
    if bytes.is_empty() {
        return Err(anyhow!("empty jpeg snapshot"));
    }
    if bytes.len() > MAX_JPEG_BYTES {
        return Err(anyhow!("jpeg snapshot exceeds {} bytes", MAX_JPEG_BYTES));
    }
    Ok(bytes)
}

fn decode_jpeg(bytes: &[u8]) -> Result<RgbImage> {
    let image = image::load_from_memory(bytes).context("decode jpeg")?;
    Ok(image.into_rgb8())
}

fn find_jpeg_bounds(buffer: &[u8]) -> Option<(usize, usize)> {
    let start = buffer.windows(2).position(|w| w == [0xFF, 0xD8])?;
    let end = buffer[start + 2..]
        .windows(2)
        .position(|w| w == [0xFF, 0xD9])?;
    Some((start, start + 2 + end + 2))
}
