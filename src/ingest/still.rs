//! Still image source ("upload" mode).
//!
//! Decodes a local JPEG/PNG once at connect time. By default the image is offered
//! exactly once; with `repeat` it is offered on every tick.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use image::RgbImage;

use super::{FrameSource, SourceStats};

pub struct StillImageSource {
    path: PathBuf,
    repeat: bool,
    image: Option<RgbImage>,
    delivered: bool,
    frame_count: u64,
}

impl StillImageSource {
    pub fn new(path: impl AsRef<Path>, repeat: bool) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            repeat,
            image: None,
            delivered: false,
            frame_count: 0,
        }
    }
}

/// Decode an image file to RGB.
pub fn load_rgb(path: &Path) -> Result<RgbImage> {
    let image = image::open(path).with_context(|| format!("decode image {}", path.display()))?;
    Ok(image.into_rgb8())
}

impl FrameSource for StillImageSource {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    fn connect(&mut self) -> Result<()> {
        let image = load_rgb(&self.path)?;
        log::info!(
            "StillImageSource: loaded {} ({}x{})",
            self.path.display(),
            image.width(),
            image.height()
        );
        self.image = Some(image);
        self.delivered = false;
        Ok(())
    }

    fn next_image(&mut self) -> Result<Option<RgbImage>> {
        let image = self
            .image
            .as_ref()
            .ok_or_else(|| anyhow!("still image source not connected; call connect() first"))?;
        if self.delivered && !self.repeat {
            return Ok(None);
        }
        self.delivered = true;
        self.frame_count += 1;
        Ok(Some(image.clone()))
    }

    fn is_healthy(&self) -> bool {
        self.image.is_some()
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            source: self.describe(),
        }
    }
}
