mod backend;
pub mod backends;
mod result;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;

pub use backend::{DetectionService, ServiceStatus};
pub use backends::{HttpBackend, HttpBackendConfig, StubBackend};
pub use result::{parse_detections, Detection, DetectionBatch};

/// Build a detection service from a base URL.
///
/// `stub://...` selects the in-process `StubBackend`; `http(s)://...` the HTTP client.
pub fn service_for_url(
    base_url: &str,
    timeout: Option<Duration>,
) -> Result<Arc<dyn DetectionService>> {
    if base_url.starts_with("stub://") {
        log::info!("detection backend: stub ({})", base_url);
        return Ok(Arc::new(StubBackend::default()));
    }
    let backend = HttpBackend::new(HttpBackendConfig {
        base_url: base_url.to_string(),
        timeout,
    })?;
    log::info!("detection backend: {}", backend.detect_url());
    Ok(Arc::new(backend))
}
