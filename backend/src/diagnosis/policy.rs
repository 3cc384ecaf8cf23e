use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use image::RgbImage;
use std::collections::HashSet;

use shared::{
    DiagnosisReport, Detection, DiseaseKind, LeafClass, LiveDetectionInfo, HEALTHY_LABEL,
    NOT_DETECTED_SENTINEL,
};

use super::advisory::{build_advisory, MODEL_UNAVAILABLE_ADVISORY, NOT_DETECTED_ADVISORY};
use super::annotate::Annotator;

/// Finalized, threshold-applied outcome for one image or frame.
///
/// Valid for display only while `threshold_used` matches the session's
/// configured threshold; the session controller recomputes on mismatch.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnosis {
    pub diseases: Vec<String>,
    pub average_confidence: f32,
    pub advisory: String,
    pub annotated: Option<RgbImage>,
    pub threshold_used: f32,
}

impl Diagnosis {
    /// Error-shaped result used when the model never loaded, so the client
    /// always has a well-formed object to render.
    pub fn model_unavailable(threshold: f32) -> Self {
        Self {
            diseases: Vec::new(),
            average_confidence: 0.0,
            advisory: MODEL_UNAVAILABLE_ADVISORY.to_string(),
            annotated: None,
            threshold_used: threshold,
        }
    }

    pub fn to_report(&self, saved: bool, warning: Option<String>) -> DiagnosisReport {
        DiagnosisReport {
            diseases: self.diseases.clone(),
            average_confidence: self.average_confidence,
            advisory: self.advisory.clone(),
            annotated_image: self.annotated.as_ref().and_then(encode_png),
            threshold_used: self.threshold_used,
            saved,
            warning,
        }
    }

    pub fn to_live_info(&self) -> LiveDetectionInfo {
        LiveDetectionInfo {
            diseases: self.diseases.clone(),
            average_confidence: self.average_confidence,
            advisory: self.advisory.clone(),
        }
    }
}

/// Turn a raw detection list into the final diagnosis for one image.
///
/// Disease detections always take priority over a simultaneous healthy
/// detection: one positive disease signal anywhere in the frame overrides a
/// healthy classification. Healthy and sub-threshold detections are never
/// drawn.
pub fn aggregate(
    image: &RgbImage,
    detections: &[Detection],
    threshold: f32,
    annotator: &Annotator,
) -> Diagnosis {
    let mut annotated = image.clone();
    let mut diseases: Vec<String> = Vec::new();
    let mut seen: HashSet<DiseaseKind> = HashSet::new();
    let mut confidence_sum = 0f32;
    let mut disease_count = 0usize;
    let mut best_healthy: Option<f32> = None;

    for detection in detections {
        if detection.class == LeafClass::Healthy {
            if detection.confidence >= threshold
                && best_healthy.is_none_or(|s| detection.confidence > s)
            {
                best_healthy = Some(detection.confidence);
            }
            continue;
        }

        if detection.confidence < threshold {
            continue;
        }

        let label = detection.class.label();
        annotator.draw_detection(&mut annotated, &detection.bbox, &label, detection.confidence);
        diseases.push(format!("{} ({:.1}%)", label, detection.confidence * 100.0));
        if let LeafClass::Disease(kind) = &detection.class {
            seen.insert(*kind);
        }
        confidence_sum += detection.confidence;
        disease_count += 1;
    }

    if disease_count > 0 {
        Diagnosis {
            diseases,
            average_confidence: confidence_sum / disease_count as f32,
            advisory: build_advisory(&seen),
            annotated: Some(annotated),
            threshold_used: threshold,
        }
    } else if let Some(score) = best_healthy {
        Diagnosis {
            diseases: vec![HEALTHY_LABEL.to_string()],
            average_confidence: score,
            advisory: String::new(),
            annotated: Some(annotated),
            threshold_used: threshold,
        }
    } else {
        Diagnosis {
            diseases: vec![NOT_DETECTED_SENTINEL.to_string()],
            average_confidence: 0.0,
            advisory: NOT_DETECTED_ADVISORY.to_string(),
            annotated: Some(annotated),
            threshold_used: threshold,
        }
    }
}

fn encode_png(image: &RgbImage) -> Option<String> {
    let mut buf = Vec::new();
    let mut cursor = std::io::Cursor::new(&mut buf);
    match image.write_to(&mut cursor, image::ImageFormat::Png) {
        Ok(()) => Some(BASE64.encode(&buf)),
        Err(e) => {
            log::warn!("failed to encode annotated image: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::BBox;

    fn det(label: &str, confidence: f32) -> Detection {
        Detection {
            bbox: BBox { x1: 4, y1: 4, x2: 40, y2: 40 },
            class: LeafClass::from_label(label),
            confidence,
        }
    }

    fn run(detections: &[Detection], threshold: f32) -> Diagnosis {
        let image = RgbImage::new(64, 64);
        aggregate(&image, detections, threshold, &Annotator::new(None))
    }

    #[test]
    fn disease_overrides_simultaneous_healthy() {
        let result = run(&[det("Downy_Mildew", 0.80), det("Daun Sehat", 0.95)], 0.5);
        assert_eq!(result.diseases, vec!["Downy_Mildew (80.0%)".to_string()]);
        assert!((result.average_confidence - 0.80).abs() < 1e-6);
        assert!(result.advisory.contains("embun bulu"));
    }

    #[test]
    fn healthy_branch_when_no_disease_qualifies() {
        let result = run(&[det("Daun Sehat", 0.95)], 0.5);
        assert_eq!(result.diseases, vec![HEALTHY_LABEL.to_string()]);
        assert!((result.average_confidence - 0.95).abs() < 1e-6);
        assert_eq!(result.advisory, "");
    }

    #[test]
    fn empty_detection_list_reports_not_detected() {
        let result = run(&[], 0.5);
        assert_eq!(result.diseases, vec![NOT_DETECTED_SENTINEL.to_string()]);
        assert_eq!(result.average_confidence, 0.0);
        assert_eq!(result.advisory, NOT_DETECTED_ADVISORY);
    }

    #[test]
    fn sub_threshold_disease_equals_empty_case() {
        let filtered = run(&[det("Downy_Mildew", 0.40)], 0.5);
        let empty = run(&[], 0.5);
        assert_eq!(filtered, empty);
    }

    #[test]
    fn priority_holds_for_many_healthy_detections() {
        let result = run(
            &[
                det("Daun Sehat", 0.99),
                det("Daun Sehat", 0.98),
                det("Virus_Gemini", 0.51),
                det("Daun Sehat", 0.97),
            ],
            0.5,
        );
        assert_eq!(result.diseases, vec!["Virus_Gemini (51.0%)".to_string()]);
        assert!(result.advisory.contains("kutu kebul"));
    }

    #[test]
    fn average_covers_only_retained_detections() {
        let result = run(
            &[
                det("Downy_Mildew", 0.9),
                det("Virus_Gemini", 0.7),
                det("Downy_Mildew", 0.2), // filtered out
            ],
            0.5,
        );
        assert_eq!(result.diseases.len(), 2);
        assert!((result.average_confidence - 0.8).abs() < 1e-6);
    }

    #[test]
    fn unknown_disease_label_gets_generic_advisory() {
        let result = run(&[det("Powdery_Mildew", 0.75)], 0.5);
        assert_eq!(result.diseases, vec!["Powdery_Mildew (75.0%)".to_string()]);
        assert_eq!(result.advisory, super::super::advisory::GENERIC_ADVISORY);
    }

    #[test]
    fn raising_threshold_never_retains_more() {
        let detections = vec![
            det("Downy_Mildew", 0.9),
            det("Virus_Gemini", 0.6),
            det("Downy_Mildew", 0.3),
            det("Daun Sehat", 0.8),
        ];

        let mut previous = usize::MAX;
        for threshold in [0.0, 0.25, 0.5, 0.75, 1.0] {
            let result = run(&detections, threshold);
            let retained = if result.diseases == vec![HEALTHY_LABEL.to_string()]
                || result.diseases == vec![NOT_DETECTED_SENTINEL.to_string()]
            {
                0
            } else {
                result.diseases.len()
            };
            assert!(retained <= previous);
            previous = retained;
        }
    }

    #[test]
    fn aggregation_is_deterministic() {
        let detections = vec![
            det("Downy_Mildew", 0.8),
            det("Daun Sehat", 0.9),
            det("Virus_Gemini", 0.55),
        ];
        let a = run(&detections, 0.5);
        let b = run(&detections, 0.5);
        assert_eq!(a, b);
    }

    #[test]
    fn healthy_and_filtered_detections_are_never_drawn() {
        let image = RgbImage::new(64, 64);
        let result = aggregate(
            &image,
            &[det("Daun Sehat", 0.95), det("Downy_Mildew", 0.2)],
            0.5,
            &Annotator::new(None),
        );
        assert_eq!(result.annotated.as_ref().unwrap(), &image);
    }

    #[test]
    fn threshold_zero_keeps_everything_above_engine_floor() {
        let result = run(&[det("Downy_Mildew", 0.02)], 0.0);
        assert_eq!(result.diseases, vec!["Downy_Mildew (2.0%)".to_string()]);
    }

    #[test]
    fn model_unavailable_shape() {
        let result = Diagnosis::model_unavailable(0.5);
        assert!(result.diseases.is_empty());
        assert_eq!(result.average_confidence, 0.0);
        assert_eq!(result.advisory, MODEL_UNAVAILABLE_ADVISORY);
        assert!(result.annotated.is_none());
        let report = result.to_report(false, None);
        assert!(report.annotated_image.is_none());
        assert!(!report.saved);
    }
}
