//! Frame capture sources.
//!
//! This module provides the sources a producer can pull frames from:
//! - Synthetic pattern (`stub://name`, testing)
//! - Still image file (local path, "upload" mode)
//! - HTTP camera (`http(s)://`, MJPEG stream or JPEG snapshot)
//!
//! Every source yields decoded RGB images. Encoding to the upload format is the
//! producer's job, so every frame goes out at the configured JPEG quality.
//!
//! Sources MUST NOT:
//! - Block a tick waiting for a new frame when none is ready (return `None`)
//! - Buffer more than the latest frame

use anyhow::Result;
use image::RgbImage;

pub mod http;
pub mod still;
pub mod synthetic;

pub use http::{HttpCameraConfig, HttpCameraSource};
pub use still::StillImageSource;
pub use synthetic::{SyntheticConfig, SyntheticSource};

/// Frame statistics for a source.
#[derive(Clone, Debug, Default)]
pub struct SourceStats {
    pub frames_captured: u64,
    pub source: String,
}

/// A producer's frame supply.
pub trait FrameSource: Send {
    /// Human-readable origin (URL or path).
    fn describe(&self) -> String;

    /// Open the device/file/stream. Failure means capture cannot start.
    fn connect(&mut self) -> Result<()>;

    /// The next frame, or `None` when no new frame is available this tick.
    fn next_image(&mut self) -> Result<Option<RgbImage>>;

    fn is_healthy(&self) -> bool {
        true
    }

    fn stats(&self) -> SourceStats;
}

impl<T: FrameSource + ?Sized> FrameSource for Box<T> {
    fn describe(&self) -> String {
        (**self).describe()
    }

    fn connect(&mut self) -> Result<()> {
        (**self).connect()
    }

    fn next_image(&mut self) -> Result<Option<RgbImage>> {
        (**self).next_image()
    }

    fn is_healthy(&self) -> bool {
        (**self).is_healthy()
    }

    fn stats(&self) -> SourceStats {
        (**self).stats()
    }
}

/// Open a source from a spec string, dispatching on scheme.
///
/// - `stub://...` → `SyntheticSource`
/// - `http(s)://...` → `HttpCameraSource`
/// - anything without a scheme → `StillImageSource` (path)
pub fn open_source(spec: &str, repeat_still: bool) -> Result<Box<dyn FrameSource>> {
    let spec = spec.trim();
    if spec.starts_with("stub://") {
        return Ok(Box::new(SyntheticSource::new(SyntheticConfig {
            name: spec.to_string(),
            ..SyntheticConfig::default()
        })));
    }
    if spec.starts_with("http://") || spec.starts_with("https://") {
        return Ok(Box::new(HttpCameraSource::new(HttpCameraConfig {
            url: spec.to_string(),
        })?));
    }
    if spec.contains("://") {
        anyhow::bail!(
            "unsupported source '{}'; expected stub://, http(s):// or a file path",
            spec
        );
    }
    Ok(Box::new(StillImageSource::new(spec, repeat_still)))
}
