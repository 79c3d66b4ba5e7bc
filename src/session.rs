//! Detection session: request gate, unique-class set, and completion path.
//!
//! State machine:
//!
//! ```text
//! Stopped --begin--> Idle --submit--> Capturing --complete--> Idle
//!    ^                 |                  |
//!    +------end--------+------end---------+
//! ```
//!
//! At most one request is outstanding, across restarts too: a request abandoned by
//! `end` still blocks submissions until its thread returns. A submission while a
//! request is outstanding is dropped, never queued. Every `begin`/`end` advances the
//! generation; a completion from an older generation only releases the request slot.

use std::collections::BTreeSet;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::Duration;

use crate::detect::{DetectionBatch, DetectionService};
use crate::error::DetectError;
use crate::frame::{Frame, DEFAULT_JPEG_QUALITY};
use crate::sink::{LogSink, Renderer};

pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.5;

/// Interval of the live camera client.
pub const LIVE_INTERVAL: Duration = Duration::from_millis(200);
/// Interval of the upload client.
pub const UPLOAD_INTERVAL: Duration = Duration::from_millis(1000);

/// Per-session settings, fixed at construction.
#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// Detection service base URL (`http(s)://` or `stub://`).
    pub backend_url: String,
    /// Capture tick period.
    pub interval: Duration,
    /// Classes are recorded only for detections strictly above this confidence.
    pub confidence_threshold: f32,
    /// JPEG quality, 1..=100.
    pub jpeg_quality: u8,
    /// Request timeout. `None` keeps the transport default.
    pub request_timeout: Option<Duration>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            backend_url: "http://127.0.0.1:8000".to_string(),
            interval: UPLOAD_INTERVAL,
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            request_timeout: None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProducerState {
    Idle,
    /// A detection request is outstanding.
    Capturing,
    Stopped,
}

/// What a tick did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TickOutcome {
    Submitted,
    /// A request was already outstanding; the frame was dropped.
    SkippedInFlight,
    /// The source had no new frame.
    NoFrame,
    EncodeFailed,
    CaptureFailed,
    Stopped,
}

/// Counters for one session. Reset on `begin`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub frames_submitted: u64,
    pub ticks_skipped: u64,
    pub batches_applied: u64,
    pub detections_applied: u64,
    pub encode_failures: u64,
    pub capture_failures: u64,
    pub transport_errors: u64,
    pub backend_errors: u64,
}

impl SessionStats {
    fn record(&mut self, error: &DetectError) {
        match error {
            DetectError::Capture(_) => self.capture_failures += 1,
            DetectError::Encode(_) => self.encode_failures += 1,
            DetectError::Transport(_) => self.transport_errors += 1,
            DetectError::Backend { .. } => self.backend_errors += 1,
        }
    }
}

struct SessionState {
    phase: ProducerState,
    generation: u64,
    /// A request thread is running, possibly for an earlier generation.
    request_running: bool,
    seen_classes: BTreeSet<String>,
    stats: SessionStats,
}

struct SessionInner {
    config: SessionConfig,
    service: Arc<dyn DetectionService>,
    renderer: Arc<dyn Renderer>,
    log_sink: Arc<dyn LogSink>,
    state: Mutex<SessionState>,
    idle: Condvar,
}

/// Shared handle to one detection session. Cloning shares the session.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl Session {
    pub fn new(
        config: SessionConfig,
        service: Arc<dyn DetectionService>,
        renderer: Arc<dyn Renderer>,
        log_sink: Arc<dyn LogSink>,
    ) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                config,
                service,
                renderer,
                log_sink,
                state: Mutex::new(SessionState {
                    phase: ProducerState::Stopped,
                    generation: 0,
                    request_running: false,
                    seen_classes: BTreeSet::new(),
                    stats: SessionStats::default(),
                }),
                idle: Condvar::new(),
            }),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    pub fn service(&self) -> &Arc<dyn DetectionService> {
        &self.inner.service
    }

    pub(crate) fn log_sink(&self) -> &Arc<dyn LogSink> {
        &self.inner.log_sink
    }

    /// Stopped -> Idle. Clears the class set and stats. No-op if already active.
    pub fn begin(&self) {
        let mut state = self.inner.lock();
        if state.phase != ProducerState::Stopped {
            return;
        }
        state.phase = ProducerState::Idle;
        state.generation += 1;
        state.seen_classes.clear();
        state.stats = SessionStats::default();
        log::info!("session started (generation {})", state.generation);
    }

    /// Any -> Stopped. An outstanding request's result will be discarded.
    pub fn end(&self) {
        let mut state = self.inner.lock();
        if state.phase == ProducerState::Stopped {
            return;
        }
        let abandoned = state.phase == ProducerState::Capturing;
        state.phase = ProducerState::Stopped;
        state.generation += 1;
        log::info!(
            "session stopped (in-flight request abandoned: {})",
            abandoned
        );
        self.inner.idle.notify_all();
    }

    pub fn phase(&self) -> ProducerState {
        self.inner.lock().phase
    }

    pub fn is_idle(&self) -> bool {
        self.phase() == ProducerState::Idle
    }

    /// Unique classes observed above the threshold this session, sorted.
    pub fn seen_classes(&self) -> Vec<String> {
        self.inner.lock().seen_classes.iter().cloned().collect()
    }

    pub fn stats(&self) -> SessionStats {
        self.inner.lock().stats
    }

    /// True while a request thread is running, including one abandoned by `end`.
    pub fn request_outstanding(&self) -> bool {
        self.inner.lock().request_running
    }

    /// Submit a frame if no request is outstanding.
    ///
    /// On `Submitted` the request runs on its own thread and completes through the
    /// session. Otherwise the frame is dropped.
    pub fn submit(&self, frame: Frame) -> TickOutcome {
        let generation = {
            let mut state = self.inner.lock();
            if state.phase == ProducerState::Stopped {
                return TickOutcome::Stopped;
            }
            if state.request_running {
                state.stats.ticks_skipped += 1;
                log::debug!(
                    "frame #{} dropped: request still outstanding",
                    frame.sequence
                );
                return TickOutcome::SkippedInFlight;
            }
            state.phase = ProducerState::Capturing;
            state.request_running = true;
            state.stats.frames_submitted += 1;
            state.generation
        };

        let inner = Arc::clone(&self.inner);
        std::thread::spawn(move || {
            let result = inner.service.detect(&frame);
            inner.complete(generation, &frame, result);
        });
        TickOutcome::Submitted
    }

    /// Record a tick that was skipped because a request was outstanding.
    pub fn note_skipped(&self) {
        let mut state = self.inner.lock();
        if state.phase != ProducerState::Stopped {
            state.stats.ticks_skipped += 1;
        }
    }

    /// Report a tick-level failure (capture or encode) for the active session.
    pub fn report(&self, error: DetectError) {
        let mut state = self.inner.lock();
        if state.phase == ProducerState::Stopped {
            return;
        }
        state.stats.record(&error);
        self.inner.log_sink.report(&error);
    }

    /// Block until no request is outstanding. Returns false on timeout.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let state = self.inner.lock();
        match self
            .inner
            .idle
            .wait_timeout_while(state, timeout, |state| state.request_running)
        {
            Ok((_, result)) => !result.timed_out(),
            Err(_) => false,
        }
    }
}

impl SessionInner {
    fn lock(&self) -> MutexGuard<'_, SessionState> {
        // A panicking sink must not wedge the producer.
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn complete(
        &self,
        generation: u64,
        frame: &Frame,
        result: Result<DetectionBatch, DetectError>,
    ) {
        let mut state = self.lock();
        state.request_running = false;
        if state.generation != generation || state.phase != ProducerState::Capturing {
            log::debug!(
                "frame #{}: discarding result from stopped session (generation {})",
                frame.sequence,
                generation
            );
            self.idle.notify_all();
            return;
        }

        match result {
            Ok(batch) => {
                let threshold = self.config.confidence_threshold;
                for det in batch.above(threshold) {
                    if state.seen_classes.insert(det.class().to_string()) {
                        self.log_sink.new_class(det.class());
                    }
                }
                state.stats.batches_applied += 1;
                state.stats.detections_applied += batch.len() as u64;
                log::debug!(
                    "frame #{}: {} detection(s) applied",
                    frame.sequence,
                    batch.len()
                );
                self.renderer.render(frame, &batch);
            }
            Err(error) => {
                state.stats.record(&error);
                self.log_sink.report(&error);
            }
        }

        state.phase = ProducerState::Idle;
        self.idle.notify_all();
    }
}
