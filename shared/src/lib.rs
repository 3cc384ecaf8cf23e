mod classes;

pub use classes::{DiseaseKind, LeafClass, HEALTHY_LABEL, NOT_DETECTED_SENTINEL};

use chrono::{DateTime, Utc};
use derive_more::Display;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Axis-aligned bounding box in pixel coordinates of the input image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BBox {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl BBox {
    pub fn width(&self) -> i32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> i32 {
        self.y2 - self.y1
    }

    /// Intersection over union with another box.
    pub fn iou(&self, other: &BBox) -> f32 {
        let ix1 = self.x1.max(other.x1);
        let iy1 = self.y1.max(other.y1);
        let ix2 = self.x2.min(other.x2);
        let iy2 = self.y2.min(other.y2);
        let inter = ((ix2 - ix1).max(0) * (iy2 - iy1).max(0)) as f32;
        if inter == 0.0 {
            return 0.0;
        }
        let union =
            (self.width() * self.height() + other.width() * other.height()) as f32 - inter;
        inter / union
    }
}

/// One raw model output: box, class, confidence in [0, 1].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub bbox: BBox,
    pub class: LeafClass,
    pub confidence: f32,
}

/// Where the current session's input came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
pub enum InputSource {
    #[serde(rename = "upload")]
    #[display(fmt = "upload")]
    Upload,
    #[serde(rename = "webcam_live")]
    #[display(fmt = "webcam_live")]
    WebcamLive,
}

/// Finalized, threshold-applied outcome for one image or frame, as returned
/// to the client. The annotated image is a base64-encoded PNG; it is absent
/// when annotation was not possible (e.g. the model is unavailable).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosisReport {
    pub diseases: Vec<String>,
    pub average_confidence: f32,
    pub advisory: String,
    pub annotated_image: Option<String>,
    pub threshold_used: f32,
    /// Whether a history record was written for this response.
    pub saved: bool,
    /// Non-fatal problem the user should see (e.g. history save failed).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

/// Latest live-stream detection info. Deliberately image-free: the client
/// already renders its own camera preview.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveDetectionInfo {
    pub diseases: Vec<String>,
    pub average_confidence: f32,
    pub advisory: String,
}

/// One persisted detection, newest-first in history listings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: Uuid,
    pub detection_date: DateTime<Utc>,
    pub image_path: String,
    pub diseases: Vec<String>,
    pub confidence: f32,
    pub recommendations: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThresholdRequest {
    pub threshold: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iou_of_disjoint_boxes_is_zero() {
        let a = BBox { x1: 0, y1: 0, x2: 10, y2: 10 };
        let b = BBox { x1: 20, y1: 20, x2: 30, y2: 30 };
        assert_eq!(a.iou(&b), 0.0);
    }

    #[test]
    fn iou_of_identical_boxes_is_one() {
        let a = BBox { x1: 5, y1: 5, x2: 25, y2: 45 };
        assert!((a.iou(&a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn source_tags_use_snake_case_strings() {
        assert_eq!(InputSource::Upload.to_string(), "upload");
        assert_eq!(InputSource::WebcamLive.to_string(), "webcam_live");
    }
}
