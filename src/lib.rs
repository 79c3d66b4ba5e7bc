//! Real-time object detection client
//!
//! This crate captures frames, uploads them one at a time to a remote single-image
//! object detection service, and tracks what the service reports.
//!
//! # Architecture
//!
//! - **Frame producer** (`producer`): timer-driven capture from a `FrameSource`, JPEG
//!   encoding, and submission. Ticks that arrive while a request is outstanding are
//!   dropped, never queued.
//! - **Session** (`session`): Idle/Capturing/Stopped gate, the set of unique classes
//!   seen above the confidence threshold, and completion with cancellation on stop.
//! - **Detection client** (`detect`): multipart `POST {base}/detect`, JSON reply
//!   validation, and error classification.
//! - **Sources** (`ingest`): synthetic, still image, HTTP camera.
//! - **Sinks** (`sink`): renderer and log sink seams.
//!
//! # Module Structure
//!
//! - `frame`: encoded frame container
//! - `config`: file + env configuration
//! - `error`: per-tick error taxonomy

pub mod config;
pub mod detect;
pub mod error;
pub mod frame;
pub mod ingest;
pub mod producer;
pub mod session;
pub mod sink;

pub use config::{CadenceProfile, ClientConfig};
pub use detect::{
    parse_detections, service_for_url, Detection, DetectionBatch, DetectionService,
    HttpBackend, HttpBackendConfig, ServiceStatus, StubBackend,
};
pub use error::DetectError;
pub use frame::{encode_jpeg, Frame, DEFAULT_JPEG_QUALITY, MAX_FRAME_BYTES};
pub use ingest::{open_source, FrameSource, SourceStats};
pub use producer::Producer;
pub use session::{ProducerState, Session, SessionConfig, SessionStats, TickOutcome};
pub use sink::{EnvLogSink, JsonLinesRenderer, LogRenderer, LogSink, Renderer};
