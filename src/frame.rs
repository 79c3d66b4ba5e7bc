//! Encoded frame container.
//!
//! - `Frame`: one JPEG-compressed capture, ready to be uploaded. The byte buffer is
//!   guaranteed non-empty by construction.
//! - `encode_jpeg`: rasterizes an RGB image to JPEG at a given quality.
//!
//! Frames are produced once per capture tick and dropped after their detection request
//! resolves or fails. Nothing here retains frames across ticks.

use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;
use std::time::SystemTime;

use crate::error::DetectError;

/// Default JPEG quality.
pub const DEFAULT_JPEG_QUALITY: u8 = 80;

/// Upper bound on an encoded frame. Larger buffers are rejected before upload.
pub const MAX_FRAME_BYTES: usize = 5 * 1024 * 1024;

/// One encoded frame.
///
/// There is no public constructor that accepts an empty buffer.
#[derive(Clone, Debug)]
pub struct Frame {
    jpeg: Vec<u8>,

    /// Pixel dimensions of the encoded image. Detection boxes live in this space.
    pub width: u32,
    pub height: u32,

    /// Wall-clock capture time.
    pub captured_at: SystemTime,

    /// Per-session capture counter.
    pub sequence: u64,
}

impl Frame {
    /// Encode an RGB image as a JPEG frame.
    pub fn encode(image: &RgbImage, quality: u8, sequence: u64) -> Result<Self, DetectError> {
        let jpeg = encode_jpeg(image, quality)?;
        Self::from_jpeg(jpeg, image.width(), image.height(), sequence)
    }

    /// Wrap an already-encoded JPEG buffer.
    pub fn from_jpeg(
        jpeg: Vec<u8>,
        width: u32,
        height: u32,
        sequence: u64,
    ) -> Result<Self, DetectError> {
        if jpeg.is_empty() {
            return Err(DetectError::Encode("encoded frame is empty".to_string()));
        }
        if jpeg.len() > MAX_FRAME_BYTES {
            return Err(DetectError::Encode(format!(
                "encoded frame is {} bytes, limit is {}",
                jpeg.len(),
                MAX_FRAME_BYTES
            )));
        }
        Ok(Self {
            jpeg,
            width,
            height,
            captured_at: SystemTime::now(),
            sequence,
        })
    }

    pub fn jpeg_bytes(&self) -> &[u8] {
        &self.jpeg
    }

    pub fn byte_len(&self) -> usize {
        self.jpeg.len()
    }
}

/// Rasterize an RGB image to a JPEG buffer.
///
/// `quality` is clamped to 1..=100. A zero-sized image is an encoding error.
pub fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Vec<u8>, DetectError> {
    if image.width() == 0 || image.height() == 0 {
        return Err(DetectError::Encode(format!(
            "cannot encode {}x{} image",
            image.width(),
            image.height()
        )));
    }
    let mut buffer = Vec::new();
    JpegEncoder::new_with_quality(&mut buffer, quality.clamp(1, 100))
        .encode_image(image)
        .map_err(|err| DetectError::Encode(format!("JPEG encode failed: {err}")))?;
    if buffer.is_empty() {
        return Err(DetectError::Encode("JPEG encoder produced no bytes".to_string()));
    }
    Ok(buffer)
}
