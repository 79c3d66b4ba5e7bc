//! HTTP detection client.
//!
//! Uploads one frame per call as `multipart/form-data` to `POST {base}/detect` and parses
//! the JSON array reply. Non-success statuses become `DetectError::Backend` carrying the
//! reply's `detail`; network failures become `DetectError::Transport`.
//!
//! The client MUST NOT:
//! - Retry on its own (the producer's next tick is the retry)
//! - Queue frames
//! - Log frame bytes

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use url::Url;

use crate::detect::backend::{DetectionService, ServiceStatus};
use crate::detect::result::{parse_detections, DetectionBatch};
use crate::error::DetectError;
use crate::frame::Frame;

const FILE_FIELD: &str = "file";
const FILE_NAME: &str = "frame.jpg";

/// Configuration for the HTTP detection client.
#[derive(Clone, Debug)]
pub struct HttpBackendConfig {
    /// Service base URL, e.g. `http://127.0.0.1:8000`.
    pub base_url: String,
    /// Overall request timeout. `None` keeps the transport default.
    pub timeout: Option<Duration>,
}

impl Default for HttpBackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000".to_string(),
            timeout: None,
        }
    }
}

/// Blocking HTTP client for a single-image detection service.
pub struct HttpBackend {
    agent: ureq::Agent,
    detect_url: String,
    status_url: String,
}

impl HttpBackend {
    pub fn new(config: HttpBackendConfig) -> Result<Self> {
        let base = validate_base_url(&config.base_url)?;
        let mut builder = ureq::AgentBuilder::new();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            agent: builder.build(),
            detect_url: format!("{}/detect", base),
            status_url: format!("{}/status", base),
        })
    }

    pub fn detect_url(&self) -> &str {
        &self.detect_url
    }
}

impl DetectionService for HttpBackend {
    fn name(&self) -> &'static str {
        "http"
    }

    fn detect(&self, frame: &Frame) -> Result<DetectionBatch, DetectError> {
        let boundary = new_boundary();
        let body = multipart_body(&boundary, frame.jpeg_bytes());
        log::debug!(
            "frame #{}: uploading {} bytes ({}x{}) to {}",
            frame.sequence,
            frame.byte_len(),
            frame.width,
            frame.height,
            self.detect_url
        );

        let response = self
            .agent
            .post(&self.detect_url)
            .set(
                "Content-Type",
                &format!("multipart/form-data; boundary={}", boundary),
            )
            .set("Accept", "application/json")
            .send_bytes(&body)
            .map_err(map_ureq_error)?;

        let text = response
            .into_string()
            .map_err(|e| DetectError::Transport(format!("read detection reply: {}", e)))?;
        Ok(parse_detections(&text, frame.sequence))
    }

    fn status(&self) -> Result<ServiceStatus, DetectError> {
        let response = self
            .agent
            .get(&self.status_url)
            .set("Accept", "application/json")
            .call()
            .map_err(map_ureq_error)?;
        let text = response
            .into_string()
            .map_err(|e| DetectError::Transport(format!("read status reply: {}", e)))?;
        serde_json::from_str(&text).map_err(|e| DetectError::Backend {
            status: 200,
            detail: format!("invalid status reply: {}", e),
        })
    }
}

/// Normalize a base URL: http(s) only, no trailing slash.
pub(crate) fn validate_base_url(raw: &str) -> Result<String> {
    let url = Url::parse(raw.trim()).with_context(|| format!("parse backend url '{}'", raw))?;
    match url.scheme() {
        "http" | "https" => {}
        other => {
            return Err(anyhow!(
                "unsupported backend scheme '{}'; expected http(s)",
                other
            ))
        }
    }
    if url.host_str().is_none() {
        return Err(anyhow!("backend url '{}' has no host", raw));
    }
    Ok(url.as_str().trim_end_matches('/').to_string())
}

fn new_boundary() -> String {
    format!("----rtod-frame-{:016x}", rand::random::<u64>())
}

/// Build a `multipart/form-data` body with a single JPEG file part.
pub(crate) fn multipart_body(boundary: &str, jpeg: &[u8]) -> Vec<u8> {
    let head = format!(
        "--{boundary}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"{file}\"\r\nContent-Type: image/jpeg\r\n\r\n",
        boundary = boundary,
        field = FILE_FIELD,
        file = FILE_NAME
    );
    let tail = format!("\r\n--{}--\r\n", boundary);
    let mut body = Vec::with_capacity(head.len() + jpeg.len() + tail.len());
    body.extend_from_slice(head.as_bytes());
    body.extend_from_slice(jpeg);
    body.extend_from_slice(tail.as_bytes());
    body
}

fn map_ureq_error(err: ureq::Error) -> DetectError {
    match err {
        ureq::Error::Status(status, response) => {
            let reason = response.status_text().to_string();
            let body = response.into_string().unwrap_or_default();
            DetectError::Backend {
                status,
                detail: error_detail(&body, &reason),
            }
        }
        ureq::Error::Transport(transport) => DetectError::Transport(transport.to_string()),
    }
}

/// Pick the user-facing text out of an error reply.
///
/// Prefers a string `detail`, then any other `detail` value, then the raw body, then
/// the HTTP reason phrase.
pub(crate) fn error_detail(body: &str, reason: &str) -> String {
    if let Ok(serde_json::Value::Object(map)) = serde_json::from_str::<serde_json::Value>(body) {
        match map.get("detail") {
            Some(serde_json::Value::String(detail)) => return detail.clone(),
            Some(other) => return other.to_string(),
            None => {}
        }
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        reason.to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_is_normalized() {
        assert_eq!(
            validate_base_url("http://127.0.0.1:8000/").unwrap(),
            "http://127.0.0.1:8000"
        );
        assert_eq!(
            validate_base_url("https://detector.local/api/").unwrap(),
            "https://detector.local/api"
        );
    }

    #[test]
    fn base_url_rejects_other_schemes() {
        assert!(validate_base_url("ftp://host").is_err());
        assert!(validate_base_url("not a url").is_err());
    }

    #[test]
    fn detect_url_appends_path() {
        let backend = HttpBackend::new(HttpBackendConfig {
            base_url: "http://localhost:8000/".to_string(),
            timeout: None,
        })
        .unwrap();
        assert_eq!(backend.detect_url(), "http://localhost:8000/detect");
    }

    #[test]
    fn multipart_body_has_single_file_part() {
        let body = multipart_body("XYZ", &[0xFF, 0xD8, 0xFF, 0xD9]);
        let text = String::from_utf8_lossy(&body);

        assert!(text.starts_with("--XYZ\r\n"));
        assert!(text.contains("name=\"file\"; filename=\"frame.jpg\""));
        assert!(text.contains("Content-Type: image/jpeg\r\n\r\n"));
        assert!(text.ends_with("\r\n--XYZ--\r\n"));
        assert_eq!(text.matches("Content-Disposition").count(), 1);
        assert!(body.windows(4).any(|w| w == [0xFF, 0xD8, 0xFF, 0xD9]));
    }

    #[test]
    fn error_detail_prefers_detail_field() {
        assert_eq!(
            error_detail(r#"{"detail":"model error"}"#, "Internal Server Error"),
            "model error"
        );
        assert_eq!(
            error_detail(r#"{"detail":[{"msg":"field required"}]}"#, "Unprocessable"),
            r#"[{"msg":"field required"}]"#
        );
        assert_eq!(error_detail("  boom  ", "Bad Gateway"), "boom");
        assert_eq!(error_detail("", "Bad Gateway"), "Bad Gateway");
    }

    #[test]
    fn boundaries_differ() {
        assert_ne!(new_boundary(), new_boundary());
    }
}
