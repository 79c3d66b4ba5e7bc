use serde::{Deserialize, Serialize};

use crate::detect::result::DetectionBatch;
use crate::error::DetectError;
use crate::frame::Frame;

/// Service health report (`GET {base}/status`).
///
/// Every field is optional on the wire. A report without `status` is not ready.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceStatus {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub model_loaded: bool,
    #[serde(default)]
    pub model_device: String,
    #[serde(default)]
    pub cuda_available: bool,
    #[serde(default)]
    pub yolo_model_path: String,
    #[serde(default)]
    pub confidence_threshold: Option<f32>,
}

impl ServiceStatus {
    pub fn is_ready(&self) -> bool {
        self.status == "ok" && self.model_loaded
    }
}

/// Single-image detection service.
///
/// `detect` is one blocking round trip. Implementations perform no retries; the
/// producer's next tick is the retry.
pub trait DetectionService: Send + Sync {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Submit one frame and return its detections.
    fn detect(&self, frame: &Frame) -> Result<DetectionBatch, DetectError>;

    /// Query the service status report.
    fn status(&self) -> Result<ServiceStatus, DetectError>;
}
