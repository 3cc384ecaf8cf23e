use image::RgbImage;

use shared::InputSource;

use crate::diagnosis::annotate::Annotator;
use crate::diagnosis::policy::{aggregate, Diagnosis};
use crate::engine::model::LeafDetector;

use super::state::{DisplayState, SessionDetectionState, StoredImage};

#[derive(Debug, thiserror::Error)]
pub enum DetectError {
    #[error("unreadable input image: {0}")]
    InvalidImage(#[from] image::ImageError),
}

/// Run the engine and aggregation for one image at the session's threshold.
///
/// Engine absence or failure is converted into an error-shaped diagnosis
/// here, at the boundary, so callers always end up with something the client
/// can render. The second value is false for such placeholder results.
fn run_detection(
    detector: Option<&dyn LeafDetector>,
    annotator: &Annotator,
    image: &RgbImage,
    threshold: f32,
) -> (Diagnosis, bool) {
    let Some(detector) = detector else {
        log::warn!("detection requested but the model is unavailable");
        return (Diagnosis::model_unavailable(threshold), false);
    };

    match detector.detect(image) {
        Ok(detections) => (aggregate(image, &detections, threshold, annotator), true),
        Err(e) => {
            log::error!("detection failed: {}", e);
            (Diagnosis::model_unavailable(threshold), false)
        }
    }
}

fn recompute(
    state: &mut SessionDetectionState,
    detector: Option<&dyn LeafDetector>,
    annotator: &Annotator,
) {
    let Some(stored) = state.image.as_ref() else {
        return;
    };
    let (diagnosis, _) = run_detection(detector, annotator, &stored.decoded, state.threshold);
    state.result = Some(diagnosis);
}

/// A new upload arrived. A changed file name or a source switch counts as a
/// new image: the previous result is discarded, detection runs at the
/// current threshold, and the one-shot save flag is armed. Re-submitting the
/// same image only honors a possible threshold change.
pub fn handle_new_upload(
    state: &mut SessionDetectionState,
    detector: Option<&dyn LeafDetector>,
    annotator: &Annotator,
    bytes: Vec<u8>,
    name: String,
) -> Result<(), DetectError> {
    let is_new = state.source != Some(InputSource::Upload)
        || state.image.as_ref().map(|img| img.name != name).unwrap_or(true);

    if !is_new {
        if state.display_state() == DisplayState::Stale {
            recompute(state, detector, annotator);
        }
        return Ok(());
    }

    let decoded = image::load_from_memory(&bytes)?.to_rgb8();

    let (diagnosis, ran) = run_detection(detector, annotator, &decoded, state.threshold);

    state.source = Some(InputSource::Upload);
    state.image = Some(StoredImage { bytes, name, decoded });
    state.result = Some(diagnosis);
    // Armed once per new image; threshold re-scores must not re-save, and an
    // error-shaped placeholder is not worth a history record.
    state.pending_save = ran;

    Ok(())
}

/// The threshold slider moved. A displayed upload result computed at another
/// threshold is now stale and is recomputed from the stored raw image; the
/// engine is re-invoked, not the cached detections. Live mode needs nothing
/// here: the next frame picks up the new threshold.
pub fn handle_threshold_change(
    state: &mut SessionDetectionState,
    detector: Option<&dyn LeafDetector>,
    annotator: &Annotator,
    new_threshold: f32,
) {
    state.threshold = new_threshold;
    if state.source == Some(InputSource::Upload) && state.display_state() == DisplayState::Stale {
        recompute(state, detector, annotator);
    }
}

/// One live frame arrived. Switching into live mode invalidates any
/// upload-mode state; the frame's result simply overwrites the previous one
/// and is never persisted.
pub fn handle_stream_frame(
    state: &mut SessionDetectionState,
    detector: Option<&dyn LeafDetector>,
    annotator: &Annotator,
    frame: &[u8],
) -> Result<(), DetectError> {
    let decoded = image::load_from_memory(frame)?.to_rgb8();

    if state.source != Some(InputSource::WebcamLive) {
        state.image = None;
        state.result = None;
        state.pending_save = false;
        state.source = Some(InputSource::WebcamLive);
    }

    let (diagnosis, _) = run_detection(detector, annotator, &decoded, state.threshold);
    state.result = Some(diagnosis);
    Ok(())
}

/// The live stream stopped: clear the current result so stale info is not
/// shown when display resumes without an active stream.
pub fn handle_stream_stop(state: &mut SessionDetectionState) {
    if state.source == Some(InputSource::WebcamLive) {
        state.result = None;
        state.source = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{BBox, Detection, LeafClass};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StubDetector {
        detections: Vec<Detection>,
        calls: AtomicUsize,
    }

    impl StubDetector {
        fn new(detections: Vec<Detection>) -> Self {
            Self { detections, calls: AtomicUsize::new(0) }
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl LeafDetector for StubDetector {
        fn detect(&self, _image: &RgbImage) -> Result<Vec<Detection>, crate::engine::model::EngineError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.detections.clone())
        }
    }

    fn downy(confidence: f32) -> Detection {
        Detection {
            bbox: BBox { x1: 2, y1: 2, x2: 20, y2: 20 },
            class: LeafClass::from_label("Downy_Mildew"),
            confidence,
        }
    }

    fn png_bytes() -> Vec<u8> {
        let img = RgbImage::new(32, 32);
        let mut buf = Vec::new();
        img.write_to(&mut std::io::Cursor::new(&mut buf), image::ImageFormat::Png)
            .unwrap();
        buf
    }

    fn annotator() -> Annotator {
        Annotator::new(None)
    }

    #[test]
    fn upload_produces_a_displayed_result_and_arms_save() {
        let detector = StubDetector::new(vec![downy(0.8)]);
        let mut state = SessionDetectionState::new();
        assert_eq!(state.display_state(), DisplayState::Idle);

        handle_new_upload(&mut state, Some(&detector), &annotator(), png_bytes(), "a.png".into())
            .unwrap();

        assert_eq!(state.display_state(), DisplayState::Displayed);
        assert_eq!(state.result().unwrap().diseases, vec!["Downy_Mildew (80.0%)"]);
        assert!(state.take_pending_save());
        assert!(!state.take_pending_save());
    }

    #[test]
    fn at_most_one_save_per_image_across_threshold_changes() {
        let detector = StubDetector::new(vec![downy(0.8)]);
        let mut state = SessionDetectionState::new();
        let ann = annotator();

        handle_new_upload(&mut state, Some(&detector), &ann, png_bytes(), "a.png".into()).unwrap();
        assert!(state.take_pending_save());

        handle_threshold_change(&mut state, Some(&detector), &ann, 0.7);
        handle_threshold_change(&mut state, Some(&detector), &ann, 0.3);
        assert!(!state.take_pending_save());

        handle_new_upload(&mut state, Some(&detector), &ann, png_bytes(), "b.png".into()).unwrap();
        assert!(state.take_pending_save());

        // Reverting the slider on the same image must not re-arm the flag.
        handle_threshold_change(&mut state, Some(&detector), &ann, 0.5);
        assert!(!state.take_pending_save());
    }

    #[test]
    fn threshold_change_reinvokes_the_engine() {
        let detector = StubDetector::new(vec![downy(0.8)]);
        let mut state = SessionDetectionState::new();
        let ann = annotator();

        handle_new_upload(&mut state, Some(&detector), &ann, png_bytes(), "a.png".into()).unwrap();
        assert_eq!(detector.call_count(), 1);

        handle_threshold_change(&mut state, Some(&detector), &ann, 0.9);
        assert_eq!(detector.call_count(), 2);
        assert_eq!(state.display_state(), DisplayState::Displayed);
        assert!((state.result().unwrap().threshold_used - 0.9).abs() < 1e-6);

        // Unchanged threshold is not stale and does not re-run.
        handle_threshold_change(&mut state, Some(&detector), &ann, 0.9);
        assert_eq!(detector.call_count(), 2);
    }

    #[test]
    fn resubmitting_the_same_image_does_not_rerun() {
        let detector = StubDetector::new(vec![downy(0.8)]);
        let mut state = SessionDetectionState::new();
        let ann = annotator();

        handle_new_upload(&mut state, Some(&detector), &ann, png_bytes(), "a.png".into()).unwrap();
        handle_new_upload(&mut state, Some(&detector), &ann, png_bytes(), "a.png".into()).unwrap();
        assert_eq!(detector.call_count(), 1);
        // The save flag stays armed from the first submission only.
        assert!(state.take_pending_save());
        assert!(!state.take_pending_save());
    }

    #[test]
    fn switching_to_live_mode_invalidates_upload_state() {
        let detector = StubDetector::new(vec![downy(0.8)]);
        let mut state = SessionDetectionState::new();
        let ann = annotator();

        handle_new_upload(&mut state, Some(&detector), &ann, png_bytes(), "a.png".into()).unwrap();
        handle_stream_frame(&mut state, Some(&detector), &ann, &png_bytes()).unwrap();

        assert_eq!(state.source(), Some(InputSource::WebcamLive));
        assert!(state.image().is_none());
        assert!(!state.take_pending_save());
        assert!(state.result().is_some());
    }

    #[test]
    fn stream_stop_clears_live_results() {
        let detector = StubDetector::new(vec![downy(0.8)]);
        let mut state = SessionDetectionState::new();
        let ann = annotator();

        handle_stream_frame(&mut state, Some(&detector), &ann, &png_bytes()).unwrap();
        handle_stream_stop(&mut state);

        assert!(state.result().is_none());
        assert_eq!(state.source(), None);
        assert_eq!(state.display_state(), DisplayState::Idle);
    }

    #[test]
    fn live_frames_overwrite_without_saving() {
        let detector = StubDetector::new(vec![downy(0.8)]);
        let mut state = SessionDetectionState::new();
        let ann = annotator();

        handle_stream_frame(&mut state, Some(&detector), &ann, &png_bytes()).unwrap();
        handle_stream_frame(&mut state, Some(&detector), &ann, &png_bytes()).unwrap();

        assert_eq!(detector.call_count(), 2);
        assert!(!state.take_pending_save());
    }

    #[test]
    fn missing_model_yields_error_shaped_result() {
        let mut state = SessionDetectionState::new();

        handle_new_upload(&mut state, None, &annotator(), png_bytes(), "a.png".into()).unwrap();

        let result = state.result().unwrap();
        assert!(result.diseases.is_empty());
        assert_eq!(result.average_confidence, 0.0);
        assert!(!result.advisory.is_empty());
        // Nothing real was produced, so nothing must be persisted.
        assert!(!state.take_pending_save());
    }

    #[test]
    fn undecodable_upload_is_rejected() {
        let detector = StubDetector::new(vec![]);
        let mut state = SessionDetectionState::new();

        let err = handle_new_upload(
            &mut state,
            Some(&detector),
            &annotator(),
            b"not an image".to_vec(),
            "a.png".into(),
        );
        assert!(err.is_err());
        assert_eq!(state.display_state(), DisplayState::Idle);
        assert_eq!(detector.call_count(), 0);
    }
}
