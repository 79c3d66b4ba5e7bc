use std::fmt;

/// Failure of a single capture/detect round.
///
/// Every variant except a capture failure at start is recovered at tick granularity:
/// the session reports it and waits for the next tick.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DetectError {
    /// Camera/file could not be opened or read.
    Capture(String),
    /// Frame could not be rasterized to a non-empty JPEG buffer.
    Encode(String),
    /// The detection service could not be reached (DNS, refused, timeout, ...).
    Transport(String),
    /// The detection service answered with a non-success status.
    Backend { status: u16, detail: String },
}

impl DetectError {
    /// Short stable code, used in log lines.
    pub fn code(&self) -> &'static str {
        match self {
            DetectError::Capture(_) => "capture",
            DetectError::Encode(_) => "encode",
            DetectError::Transport(_) => "transport",
            DetectError::Backend { .. } => "backend",
        }
    }

    /// Human-facing text: the service `detail` for backend errors, the message otherwise.
    pub fn detail(&self) -> &str {
        match self {
            DetectError::Capture(msg)
            | DetectError::Encode(msg)
            | DetectError::Transport(msg) => msg,
            DetectError::Backend { detail, .. } => detail,
        }
    }
}

impl fmt::Display for DetectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DetectError::Backend { status, detail } => {
                write!(f, "backend: status {}: {}", status, detail)
            }
            other => write!(f, "{}: {}", other.code(), other.detail()),
        }
    }
}

impl std::error::Error for DetectError {}
