use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use crate::detect::backend::{DetectionService, ServiceStatus};
use crate::detect::result::{Detection, DetectionBatch};
use crate::error::DetectError;
use crate::frame::Frame;

/// In-process detection service for `stub://` backends and tests.
///
/// Replays scripted replies in order, then answers every further frame with the
/// fallback detections. No network access.
pub struct StubBackend {
    fallback: Vec<Detection>,
    scripted: Mutex<VecDeque<Result<Vec<Detection>, DetectError>>>,
    calls: AtomicU64,
}

impl StubBackend {
    /// Stub that always answers with `fallback`.
    pub fn new(fallback: Vec<Detection>) -> Self {
        Self {
            fallback,
            scripted: Mutex::new(VecDeque::new()),
            calls: AtomicU64::new(0),
        }
    }

    /// Default stub: one `person` at 0.92 in the top-left corner of every frame.
    pub fn person() -> Self {
        Self::new(
            Detection::new("person", 0.92, [10.0, 10.0, 50.0, 50.0])
                .into_iter()
                .collect(),
        )
    }

    /// Queue a reply to be returned before the fallback.
    pub fn push_reply(&self, reply: Result<Vec<Detection>, DetectError>) {
        if let Ok(mut scripted) = self.scripted.lock() {
            scripted.push_back(reply);
        }
    }

    /// Number of `detect` calls served so far.
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Default for StubBackend {
    fn default() -> Self {
        Self::person()
    }
}

impl DetectionService for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn detect(&self, frame: &Frame) -> Result<DetectionBatch, DetectError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let scripted = self
            .scripted
            .lock()
            .map_err(|_| DetectError::Transport("stub backend lock poisoned".to_string()))?
            .pop_front();
        let detections = match scripted {
            Some(reply) => reply?,
            None => self.fallback.clone(),
        };
        Ok(DetectionBatch {
            frame_sequence: frame.sequence,
            detections,
        })
    }

    fn status(&self) -> Result<ServiceStatus, DetectError> {
        Ok(ServiceStatus {
            status: "ok".to_string(),
            message: "stub detection service".to_string(),
            model_loaded: true,
            model_device: "cpu".to_string(),
            ..ServiceStatus::default()
        })
    }
}
