//! Output collaborators of a session.
//!
//! - `Renderer` receives every applied `DetectionBatch` with its frame.
//! - `LogSink` receives every error and every newly observed class.
//!
//! Both are called while the session lock is held, so they MUST NOT call back into
//! the session.

use std::io::Write;
use std::sync::Mutex;

use serde::Serialize;

use crate::detect::{Detection, DetectionBatch};
use crate::error::DetectError;
use crate::frame::Frame;

pub trait Renderer: Send + Sync {
    fn render(&self, frame: &Frame, batch: &DetectionBatch);
}

pub trait LogSink: Send + Sync {
    fn report(&self, error: &DetectError);

    /// A class crossed the confidence threshold for the first time this session.
    fn new_class(&self, _class: &str) {}
}

/// Renders batches as log lines.
#[derive(Default)]
pub struct LogRenderer;

impl Renderer for LogRenderer {
    fn render(&self, frame: &Frame, batch: &DetectionBatch) {
        log::info!(
            "frame #{} ({}x{}): {} detection(s)",
            frame.sequence,
            frame.width,
            frame.height,
            batch.len()
        );
        for (idx, det) in batch.iter().enumerate() {
            let [x1, y1, x2, y2] = det.bbox();
            log::info!(
                "  [{}] {} box=[{:.0}, {:.0}, {:.0}, {:.0}]",
                idx,
                det.label(),
                x1,
                y1,
                x2,
                y2
            );
        }
    }
}

/// Renders each batch as one JSON object per line.
pub struct JsonLinesRenderer<W: Write + Send> {
    out: Mutex<W>,
}

#[derive(Serialize)]
struct BatchLine<'a> {
    frame: u64,
    width: u32,
    height: u32,
    detections: &'a [Detection],
}

impl<W: Write + Send> JsonLinesRenderer<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    pub fn into_inner(self) -> W {
        match self.out.into_inner() {
            Ok(out) => out,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl<W: Write + Send> Renderer for JsonLinesRenderer<W> {
    fn render(&self, frame: &Frame, batch: &DetectionBatch) {
        let line = BatchLine {
            frame: frame.sequence,
            width: frame.width,
            height: frame.height,
            detections: &batch.detections,
        };
        let Ok(mut out) = self.out.lock() else {
            log::error!("json renderer lock poisoned");
            return;
        };
        let written = serde_json::to_writer(&mut *out, &line)
            .map_err(std::io::Error::from)
            .and_then(|_| out.write_all(b"\n"))
            .and_then(|_| out.flush());
        if let Err(e) = written {
            log::error!("json renderer write failed: {}", e);
        }
    }
}

/// Routes reported errors to the `log` facade.
#[derive(Default)]
pub struct EnvLogSink;

impl LogSink for EnvLogSink {
    fn report(&self, error: &DetectError) {
        match error {
            DetectError::Capture(msg) => log::error!("capture failed: {}", msg),
            DetectError::Encode(msg) => log::warn!("frame skipped, encode failed: {}", msg),
            DetectError::Transport(msg) => log::warn!("detection service unreachable: {}", msg),
            DetectError::Backend { status, detail } => {
                log::error!("detection service returned {}: {}", status, detail)
            }
        }
    }

    fn new_class(&self, class: &str) {
        log::info!("new class observed: {}", class);
    }
}
