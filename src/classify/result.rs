//! Classification result types and wire parsing.
//!
//! The remote inference service responds with:
//! `{ "success": true, "data": { "detections": [...], "metadata": {...} } }`
//! where each detection carries a category label, a 0..=1 confidence, a
//! pixel-space bounding box and a per-category confidence map.
//!
//! Parsing normalizes that shape into [`ClassificationResult`], which is
//! immutable once produced and consumed exactly once by the session reducer.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::WasteCategory;

/// Tolerance for the "primary + alternatives sum to <= 1" invariant.
const CONFIDENCE_SUM_TOLERANCE: f32 = 0.05;

/// Axis-aligned bounding box in source-frame pixel space.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

impl BoundingBox {
    /// Clamp the box into `width` x `height` frame bounds.
    pub fn clamped_to(self, width: u32, height: u32) -> BoundingBox {
        let x = self.x.min(width.saturating_sub(1));
        let y = self.y.min(height.saturating_sub(1));
        BoundingBox {
            x,
            y,
            w: self.w.min(width - x),
            h: self.h.min(height - y),
        }
    }
}

/// One classified waste object within a single frame.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Detection {
    /// Index of the detection within its frame.
    pub id: u32,
    pub category: WasteCategory,
    /// Primary confidence, 0..=1.
    pub confidence: f32,
    pub bounding_box: BoundingBox,
    /// Non-primary categories, sorted by confidence descending.
    pub alternatives: Vec<(WasteCategory, f32)>,
}

impl Detection {
    /// True when the primary confidence falls under the user-facing warning
    /// threshold (0-100 scale). Distinct from the acceptance floor: a
    /// low-confidence detection is still a success, just flagged.
    pub fn low_confidence(&self) -> bool {
        self.confidence * 100.0 < super::LOW_CONFIDENCE_WARN_PERCENT
    }
}

/// Everything the proxy produced for one submitted frame.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub detections: Vec<Detection>,
    pub processing_time_ms: u64,
    pub session_id: String,
    /// Milliseconds since the Unix epoch, stamped client-side on arrival.
    pub timestamp_ms: u64,
}

impl ClassificationResult {
    /// Highest primary confidence across detections, 0.0 when empty.
    pub fn max_confidence(&self) -> f32 {
        self.detections
            .iter()
            .map(|d| d.confidence)
            .fold(0.0, f32::max)
    }
}

// -------------------- wire format --------------------

#[derive(Debug, Deserialize)]
pub(crate) struct WireResponse {
    #[serde(default)]
    pub success: bool,
    pub data: Option<WireData>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireData {
    #[serde(default)]
    pub detections: Vec<WireDetection>,
    pub metadata: Option<WireMetadata>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireDetection {
    pub category: String,
    pub confidence: f32,
    pub bbox: WireBbox,
    #[serde(default)]
    pub all_confidences: HashMap<String, f32>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireBbox {
    pub x: i64,
    pub y: i64,
    pub width: i64,
    pub height: i64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireMetadata {
    #[serde(default)]
    pub processing_time_ms: u64,
    pub image_size: Option<WireImageSize>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireImageSize {
    pub width: u32,
    pub height: u32,
}

/// Parse a 200 response body into a [`ClassificationResult`].
///
/// Returns an error if:
/// - The JSON is malformed or `success` is false
/// - The `data` section is missing
/// - A detection violates the confidence-sum invariant
pub(crate) fn parse_response(
    body: &[u8],
    session_id: &str,
    timestamp_ms: u64,
) -> Result<ClassificationResult> {
    let wire: WireResponse =
        serde_json::from_slice(body).map_err(|e| anyhow!("parse error: {}", e))?;
    if !wire.success {
        return Err(anyhow!(
            "remote reported failure: {}",
            wire.message.as_deref().unwrap_or("no detail")
        ));
    }
    let data = wire.data.ok_or_else(|| anyhow!("missing 'data' section"))?;

    let frame_size = data
        .metadata
        .as_ref()
        .and_then(|m| m.image_size.as_ref())
        .map(|s| (s.width, s.height));

    let mut detections = Vec::with_capacity(data.detections.len());
    for (i, wd) in data.detections.into_iter().enumerate() {
        detections.push(convert_detection(i as u32, wd, frame_size)?);
    }

    Ok(ClassificationResult {
        detections,
        processing_time_ms: data
            .metadata
            .map(|m| m.processing_time_ms)
            .unwrap_or_default(),
        session_id: session_id.to_string(),
        timestamp_ms,
    })
}

fn convert_detection(
    id: u32,
    wd: WireDetection,
    frame_size: Option<(u32, u32)>,
) -> Result<Detection> {
    let category = WasteCategory::parse_lossy(&wd.category);
    let confidence = wd.confidence.clamp(0.0, 1.0);

    // Alternatives: every non-primary category from the confidence map,
    // sorted descending. Their sum with the primary must stay <= 1.
    let mut alternatives: Vec<(WasteCategory, f32)> = wd
        .all_confidences
        .iter()
        .map(|(label, conf)| (WasteCategory::parse_lossy(label), conf.clamp(0.0, 1.0)))
        .filter(|(cat, _)| *cat != category)
        .collect();
    alternatives.sort_by(|a, b| b.1.total_cmp(&a.1));

    let sum: f32 = confidence + alternatives.iter().map(|(_, c)| c).sum::<f32>();
    if sum > 1.0 + CONFIDENCE_SUM_TOLERANCE {
        return Err(anyhow!(
            "detection {}: confidence sum {:.3} exceeds 1.0",
            id,
            sum
        ));
    }

    let mut bounding_box = BoundingBox {
        x: wd.bbox.x.max(0) as u32,
        y: wd.bbox.y.max(0) as u32,
        w: wd.bbox.width.max(0) as u32,
        h: wd.bbox.height.max(0) as u32,
    };
    if let Some((width, height)) = frame_size {
        bounding_box = bounding_box.clamped_to(width, height);
    }

    Ok(Detection {
        id,
        category,
        confidence,
        bounding_box,
        alternatives,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const RESPONSE_ONE_DETECTION: &str = r#"{
        "success": true,
        "data": {
            "detections": [{
                "category": "Organik",
                "confidence": 0.92,
                "classification_source": "svm",
                "bbox": {"x": 120, "y": 60, "width": 200, "height": 180},
                "all_confidences": {"Organik": 0.92, "Anorganik": 0.05, "Lainnya": 0.03}
            }],
            "metadata": {
                "processing_time_ms": 210,
                "image_size": {"width": 640, "height": 480},
                "num_detections": 1
            }
        }
    }"#;

    #[test]
    fn parse_single_detection() {
        let result = parse_response(RESPONSE_ONE_DETECTION.as_bytes(), "sess-1", 1_000).unwrap();
        assert_eq!(result.detections.len(), 1);
        assert_eq!(result.processing_time_ms, 210);
        assert_eq!(result.session_id, "sess-1");

        let det = &result.detections[0];
        assert_eq!(det.category, WasteCategory::Organik);
        assert!((det.confidence - 0.92).abs() < 1e-6);
        assert_eq!(
            det.bounding_box,
            BoundingBox {
                x: 120,
                y: 60,
                w: 200,
                h: 180
            }
        );
        // Alternatives exclude the primary and are sorted descending.
        assert_eq!(det.alternatives.len(), 2);
        assert_eq!(det.alternatives[0].0, WasteCategory::Anorganik);
        assert!(det.alternatives[0].1 >= det.alternatives[1].1);
    }

    #[test]
    fn parse_clamps_bbox_into_frame() {
        let body = r#"{
            "success": true,
            "data": {
                "detections": [{
                    "category": "Anorganik",
                    "confidence": 0.8,
                    "bbox": {"x": 600, "y": 400, "width": 200, "height": 200},
                    "all_confidences": {}
                }],
                "metadata": {"processing_time_ms": 5, "image_size": {"width": 640, "height": 480}}
            }
        }"#;
        let result = parse_response(body.as_bytes(), "s", 0).unwrap();
        let bb = result.detections[0].bounding_box;
        assert!(bb.x + bb.w <= 640);
        assert!(bb.y + bb.h <= 480);
    }

    #[test]
    fn parse_rejects_confidence_sum_above_one() {
        let body = r#"{
            "success": true,
            "data": {
                "detections": [{
                    "category": "Organik",
                    "confidence": 0.9,
                    "bbox": {"x": 0, "y": 0, "width": 10, "height": 10},
                    "all_confidences": {"Anorganik": 0.5}
                }],
                "metadata": {"processing_time_ms": 1}
            }
        }"#;
        assert!(parse_response(body.as_bytes(), "s", 0).is_err());
    }

    #[test]
    fn parse_rejects_missing_data() {
        let body = r#"{"success": true}"#;
        assert!(parse_response(body.as_bytes(), "s", 0).is_err());
    }

    #[test]
    fn empty_detections_have_zero_max_confidence() {
        let body = r#"{
            "success": true,
            "data": {"detections": [], "metadata": {"processing_time_ms": 12}}
        }"#;
        let result = parse_response(body.as_bytes(), "s", 0).unwrap();
        assert_eq!(result.max_confidence(), 0.0);
    }

    #[test]
    fn low_confidence_flag_uses_warn_threshold() {
        let det = Detection {
            id: 0,
            category: WasteCategory::Organik,
            confidence: 0.65,
            bounding_box: BoundingBox::default(),
            alternatives: Vec::new(),
        };
        assert!(det.low_confidence());
        let confident = Detection {
            confidence: 0.75,
            ..det
        };
        assert!(!confident.low_confidence());
    }
}
