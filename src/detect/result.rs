use serde::{Deserialize, Serialize};

/// One recognized object instance.
///
/// Fields are read-only once parsed.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Detection {
    class: String,
    confidence: f32,
    /// `[x1, y1, x2, y2]` in the pixel space of the submitted frame.
    #[serde(rename = "box")]
    bbox: [f32; 4],
}

impl Detection {
    /// Build a detection, rejecting a confidence outside [0,1] or a non-finite box.
    pub fn new(class: impl Into<String>, confidence: f32, bbox: [f32; 4]) -> Option<Self> {
        if !confidence.is_finite() || !(0.0..=1.0).contains(&confidence) {
            return None;
        }
        if bbox.iter().any(|v| !v.is_finite()) {
            return None;
        }
        Some(Self {
            class: class.into(),
            confidence,
            bbox,
        })
    }

    pub fn class(&self) -> &str {
        &self.class
    }

    pub fn confidence(&self) -> f32 {
        self.confidence
    }

    pub fn bbox(&self) -> [f32; 4] {
        self.bbox
    }

    /// Confidence as shown next to a box, e.g. `92.0%`.
    pub fn display_confidence(&self) -> String {
        format!("{:.1}%", self.confidence * 100.0)
    }

    /// Box caption, e.g. `person 92.0%`.
    pub fn label(&self) -> String {
        format!("{} {}", self.class, self.display_confidence())
    }
}

/// All detections returned for one frame, in service order.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct DetectionBatch {
    pub frame_sequence: u64,
    pub detections: Vec<Detection>,
}

impl DetectionBatch {
    pub fn empty(frame_sequence: u64) -> Self {
        Self {
            frame_sequence,
            detections: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.detections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Detection> {
        self.detections.iter()
    }

    /// Detections strictly above `threshold`.
    pub fn above(&self, threshold: f32) -> impl Iterator<Item = &Detection> {
        self.detections
            .iter()
            .filter(move |det| det.confidence > threshold)
    }
}

/// Wire shape of one entry in a `/detect` reply.
#[derive(Debug, Deserialize)]
struct WireDetection {
    class: String,
    confidence: f64,
    #[serde(rename = "box")]
    bbox: Vec<f64>,
}

/// Parse a successful `/detect` reply body.
///
/// - Anything other than a JSON array of well-formed entries yields an empty batch.
/// - Well-formed entries with an out-of-range confidence are dropped individually.
pub fn parse_detections(body: &str, frame_sequence: u64) -> DetectionBatch {
    let entries: Vec<WireDetection> = match serde_json::from_str(body) {
        Ok(entries) => entries,
        Err(e) => {
            log::warn!(
                "frame #{}: malformed detection reply, applying zero detections: {}",
                frame_sequence,
                e
            );
            return DetectionBatch::empty(frame_sequence);
        }
    };

    if let Some(bad) = entries.iter().position(|entry| entry.bbox.len() != 4) {
        log::warn!(
            "frame #{}: detection {} has {} box coordinates, applying zero detections",
            frame_sequence,
            bad,
            entries[bad].bbox.len()
        );
        return DetectionBatch::empty(frame_sequence);
    }

    let mut detections = Vec::with_capacity(entries.len());
    for entry in entries {
        match wire_to_detection(&entry) {
            Some(det) => detections.push(det),
            None => log::warn!(
                "frame #{}: rejected detection with confidence {} box {:?}",
                frame_sequence,
                entry.confidence,
                entry.bbox
            ),
        }
    }

    DetectionBatch {
        frame_sequence,
        detections,
    }
}

/// Range-check on the wire `f64` values, then narrow to `f32`.
///
/// A confidence just above 1 or a coordinate beyond `f32::MAX` would otherwise round
/// into range (or to infinity) in the cast.
fn wire_to_detection(entry: &WireDetection) -> Option<Detection> {
    if !entry.confidence.is_finite() || !(0.0..=1.0).contains(&entry.confidence) {
        return None;
    }
    let mut bbox = [0f32; 4];
    for (slot, &value) in bbox.iter_mut().zip(&entry.bbox) {
        if !value.is_finite() || value.abs() > f64::from(f32::MAX) {
            return None;
        }
        *slot = value as f32;
    }
    Detection::new(entry.class.clone(), entry.confidence as f32, bbox)
}
