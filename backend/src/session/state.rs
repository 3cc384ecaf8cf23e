use image::RgbImage;

use shared::InputSource;

use crate::diagnosis::policy::Diagnosis;

pub const DEFAULT_THRESHOLD: f32 = 0.5;

/// Last accepted input, kept so a threshold change can re-run detection
/// without a re-upload. The raw bytes are what gets persisted to disk.
#[derive(Debug, Clone)]
pub struct StoredImage {
    pub bytes: Vec<u8>,
    pub name: String,
    pub decoded: RgbImage,
}

/// Where the session sits relative to its current input and threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayState {
    /// No input yet.
    Idle,
    /// Input present but no result computed for it.
    Pending,
    /// Result present and computed at the current threshold.
    Displayed,
    /// Result present but the threshold moved; must recompute before display.
    Stale,
}

/// Per-session detection state. Owned exclusively by one user's session and
/// mutated only by the session controller.
#[derive(Debug)]
pub struct SessionDetectionState {
    pub(super) image: Option<StoredImage>,
    pub(super) source: Option<InputSource>,
    pub(super) result: Option<Diagnosis>,
    pub(super) pending_save: bool,
    pub(super) threshold: f32,
}

impl SessionDetectionState {
    pub fn new() -> Self {
        Self {
            image: None,
            source: None,
            result: None,
            pending_save: false,
            threshold: DEFAULT_THRESHOLD,
        }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn source(&self) -> Option<InputSource> {
        self.source
    }

    pub fn result(&self) -> Option<&Diagnosis> {
        self.result.as_ref()
    }

    pub fn image(&self) -> Option<&StoredImage> {
        self.image.as_ref()
    }

    pub fn display_state(&self) -> DisplayState {
        match (&self.image, &self.result) {
            (None, None) => DisplayState::Idle,
            (_, None) => DisplayState::Pending,
            (_, Some(result)) => {
                if (result.threshold_used - self.threshold).abs() <= f32::EPSILON {
                    DisplayState::Displayed
                } else {
                    DisplayState::Stale
                }
            }
        }
    }

    /// Consume the one-shot save flag. True at most once per new upload.
    pub fn take_pending_save(&mut self) -> bool {
        std::mem::take(&mut self.pending_save)
    }
}

impl Default for SessionDetectionState {
    fn default() -> Self {
        Self::new()
    }
}
