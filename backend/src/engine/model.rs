use image::RgbImage;
use ndarray::ArrayView2;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Tensor;
use std::sync::{Arc, Mutex};

use shared::{BBox, Detection, LeafClass};

use super::config::DetectorConfig;
use super::preprocess::chw_tensor_data;

/// Fixed internal floor applied at the model boundary. The user-facing
/// threshold is applied later by the aggregation policy, which therefore
/// always sees a near-complete raw candidate set.
pub const FLOOR_CONFIDENCE: f32 = 0.01;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("model session error: {0}")]
    Session(#[from] ort::Error),
    #[error("invalid model output: {0}")]
    InvalidOutput(String),
    #[error("model session lock poisoned")]
    LockPoisoned,
}

/// Seam between the model and everything above it. The aggregation policy
/// and session controller only ever see this trait, so they can be exercised
/// without a model file on disk.
pub trait LeafDetector: Send + Sync {
    fn detect(&self, image: &RgbImage) -> Result<Vec<Detection>, EngineError>;
}

/// ONNX-exported YOLO detector for melon leaf classes.
#[derive(Clone)]
pub struct YoloEngine {
    session: Arc<Mutex<Session>>,
    config: Arc<DetectorConfig>,
}

impl YoloEngine {
    pub fn load(config: DetectorConfig) -> Result<Self, EngineError> {
        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(4)?
            .commit_from_file(&config.model_path)?;

        log::info!(
            "Loaded detector model from '{}' ({} classes)",
            config.model_path,
            config.class_names.len()
        );

        Ok(Self {
            session: Arc::new(Mutex::new(session)),
            config: Arc::new(config),
        })
    }
}

impl LeafDetector for YoloEngine {
    fn detect(&self, image: &RgbImage) -> Result<Vec<Detection>, EngineError> {
        let input_size = self.config.input_size;
        let tensor_data = chw_tensor_data(image, input_size);
        let shape = [1usize, 3, input_size as usize, input_size as usize];
        let input_tensor = Tensor::from_array((shape, tensor_data.into_boxed_slice()))?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| EngineError::LockPoisoned)?;
        let outputs = session.run(ort::inputs![
            self.config.input_name.as_str() => input_tensor
        ])?;

        // YOLO detection head: [1, 4 + num_classes, num_proposals].
        let (_, output) = outputs
            .iter()
            .next()
            .ok_or_else(|| EngineError::InvalidOutput("model produced no outputs".into()))?;
        let (out_shape, data) = output.try_extract_tensor::<f32>()?;
        let dims: Vec<usize> = out_shape.iter().map(|d| *d as usize).collect();
        if dims.len() != 3 || dims[0] != 1 {
            return Err(EngineError::InvalidOutput(format!(
                "unexpected output shape {:?}",
                dims
            )));
        }

        let view = ArrayView2::from_shape((dims[1], dims[2]), data)
            .map_err(|e| EngineError::InvalidOutput(e.to_string()))?;

        let candidates = decode_predictions(
            view,
            &self.config.class_names,
            image.width(),
            image.height(),
            input_size,
        )?;
        let kept = nms(candidates, self.config.iou_threshold);

        log::debug!("detector produced {} raw candidates after NMS", kept.len());
        Ok(kept)
    }
}

/// Decode a `[4 + C, N]` prediction view into pixel-space detections,
/// keeping everything at or above the engine floor.
pub(crate) fn decode_predictions(
    view: ArrayView2<f32>,
    class_names: &[String],
    orig_width: u32,
    orig_height: u32,
    input_size: u32,
) -> Result<Vec<Detection>, EngineError> {
    let num_classes = class_names.len();
    if view.nrows() != 4 + num_classes {
        return Err(EngineError::InvalidOutput(format!(
            "model emits {} rows but the config names {} classes",
            view.nrows(),
            num_classes
        )));
    }

    let scale_x = orig_width as f32 / input_size as f32;
    let scale_y = orig_height as f32 / input_size as f32;

    let mut detections = Vec::new();
    for i in 0..view.ncols() {
        let mut best_score = 0f32;
        let mut best_class = 0usize;
        for c in 0..num_classes {
            let score = view[[4 + c, i]];
            if score > best_score {
                best_score = score;
                best_class = c;
            }
        }
        if best_score < FLOOR_CONFIDENCE {
            continue;
        }

        let cx = view[[0, i]];
        let cy = view[[1, i]];
        let w = view[[2, i]];
        let h = view[[3, i]];

        let x1 = (((cx - w / 2.0) * scale_x).round() as i32).clamp(0, orig_width as i32);
        let y1 = (((cy - h / 2.0) * scale_y).round() as i32).clamp(0, orig_height as i32);
        let x2 = (((cx + w / 2.0) * scale_x).round() as i32).clamp(0, orig_width as i32);
        let y2 = (((cy + h / 2.0) * scale_y).round() as i32).clamp(0, orig_height as i32);
        if x2 <= x1 || y2 <= y1 {
            continue;
        }

        detections.push(Detection {
            bbox: BBox { x1, y1, x2, y2 },
            class: LeafClass::from_label(&class_names[best_class]),
            confidence: best_score,
        });
    }

    Ok(detections)
}

/// Greedy class-aware NMS: sort by confidence descending, suppress
/// overlapping boxes of the same class.
pub(crate) fn nms(mut detections: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    detections.sort_unstable_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut kept: Vec<Detection> = Vec::new();
    let mut suppressed = vec![false; detections.len()];

    for i in 0..detections.len() {
        if suppressed[i] {
            continue;
        }
        for j in (i + 1)..detections.len() {
            if detections[i].class == detections[j].class
                && detections[i].bbox.iou(&detections[j].bbox) > iou_threshold
            {
                suppressed[j] = true;
            }
        }
        kept.push(detections[i].clone());
    }

    kept
}
