use anyhow::Result;
use image::{Rgb, RgbImage};

use super::{FrameSource, SourceStats};

/// Configuration for a synthetic source.
#[derive(Clone, Debug)]
pub struct SyntheticConfig {
    /// Source name, conventionally `stub://...`.
    pub name: String,
    pub width: u32,
    pub height: u32,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            name: "stub://camera".to_string(),
            width: 640,
            height: 480,
        }
    }
}

/// Synthetic frame source for tests and offline runs.
///
/// Produces a gradient with a bright square that moves a few pixels per frame, so
/// consecutive frames differ.
pub struct SyntheticSource {
    config: SyntheticConfig,
    frame_count: u64,
    connected: bool,
}

impl SyntheticSource {
    pub fn new(config: SyntheticConfig) -> Self {
        Self {
            config,
            frame_count: 0,
            connected: false,
        }
    }

    fn generate(&self) -> RgbImage {
        let (width, height) = (self.config.width, self.config.height);
        let side = (width.min(height) / 4).max(1);
        let offset = (self.frame_count * 4) as u32;
        let square_x = offset % width.saturating_sub(side).max(1);
        let square_y = (offset / 2) % height.saturating_sub(side).max(1);
        RgbImage::from_fn(width, height, |x, y| {
            let inside = x >= square_x && x < square_x + side && y >= square_y && y < square_y + side;
            if inside {
                Rgb([240, 240, 240])
            } else {
                Rgb([
                    (x * 255 / width.max(1)) as u8,
                    (y * 255 / height.max(1)) as u8,
                    64,
                ])
            }
        })
    }
}

impl FrameSource for SyntheticSource {
    fn describe(&self) -> String {
        self.config.name.clone()
    }

    fn connect(&mut self) -> Result<()> {
        if self.config.width == 0 || self.config.height == 0 {
            anyhow::bail!(
                "synthetic source {} has zero size {}x{}",
                self.config.name,
                self.config.width,
                self.config.height
            );
        }
        self.connected = true;
        log::info!("SyntheticSource: connected to {}", self.config.name);
        Ok(())
    }

    fn next_image(&mut self) -> Result<Option<RgbImage>> {
        if !self.connected {
            anyhow::bail!("synthetic source not connected; call connect() first");
        }
        self.frame_count += 1;
        Ok(Some(self.generate()))
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            source: self.config.name.clone(),
        }
    }
}
