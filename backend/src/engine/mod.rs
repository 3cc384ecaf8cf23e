pub mod config;
pub mod model;
pub mod preprocess;

use std::sync::Arc;

use crate::diagnosis::annotate::Annotator;
use model::{LeafDetector, YoloEngine};

/// What the handlers hold: the detector (absent when the model failed to
/// load at startup; a lost capability, never retried) and the annotator.
#[derive(Clone)]
pub struct EngineHandle {
    detector: Option<Arc<YoloEngine>>,
    pub annotator: Arc<Annotator>,
}

impl EngineHandle {
    pub fn new(detector: Option<YoloEngine>, annotator: Annotator) -> Self {
        Self {
            detector: detector.map(Arc::new),
            annotator: Arc::new(annotator),
        }
    }

    pub fn detector(&self) -> Option<&dyn LeafDetector> {
        self.detector.as_deref().map(|d| d as &dyn LeafDetector)
    }
}
