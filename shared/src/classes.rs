use serde::{Deserialize, Serialize};
use std::str::FromStr;
use strum_macros::{Display, EnumIter, EnumString};

/// Exact class label the model emits for a healthy leaf.
pub const HEALTHY_LABEL: &str = "Daun Sehat";

/// Sentinel shown when nothing met the confidence threshold.
pub const NOT_DETECTED_SENTINEL: &str = "Penyakit Tidak Terdeteksi";

/// Known disease classes, spelled exactly as the deployed model names them.
///
/// The advisory table and the aggregation policy are keyed by this enum, so
/// extending the model's class set means adding a variant here and a sentence
/// to the advisory table, nothing else.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumIter,
    EnumString,
)]
pub enum DiseaseKind {
    #[strum(serialize = "Downy_Mildew")]
    DownyMildew,
    #[strum(serialize = "Virus_Gemini")]
    GeminiVirus,
}

/// Classification of one detection, closed over the labels we understand.
///
/// Labels the model emits that we do not recognize still count as disease
/// candidates; they carry their raw label and receive the generic advisory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LeafClass {
    Healthy,
    Disease(DiseaseKind),
    Unknown(String),
}

impl LeafClass {
    pub fn from_label(label: &str) -> Self {
        if label == HEALTHY_LABEL {
            return LeafClass::Healthy;
        }
        match DiseaseKind::from_str(label) {
            Ok(kind) => LeafClass::Disease(kind),
            Err(_) => LeafClass::Unknown(label.to_string()),
        }
    }

    pub fn label(&self) -> String {
        match self {
            LeafClass::Healthy => HEALTHY_LABEL.to_string(),
            LeafClass::Disease(kind) => kind.to_string(),
            LeafClass::Unknown(raw) => raw.clone(),
        }
    }

    pub fn is_disease(&self) -> bool {
        !matches!(self, LeafClass::Healthy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_labels_round_trip() {
        assert_eq!(
            LeafClass::from_label("Downy_Mildew"),
            LeafClass::Disease(DiseaseKind::DownyMildew)
        );
        assert_eq!(
            LeafClass::from_label("Virus_Gemini"),
            LeafClass::Disease(DiseaseKind::GeminiVirus)
        );
        assert_eq!(LeafClass::from_label("Daun Sehat"), LeafClass::Healthy);
        assert_eq!(
            LeafClass::Disease(DiseaseKind::DownyMildew).label(),
            "Downy_Mildew"
        );
    }

    #[test]
    fn unrecognized_label_is_preserved() {
        let class = LeafClass::from_label("Powdery_Mildew");
        assert_eq!(class, LeafClass::Unknown("Powdery_Mildew".to_string()));
        assert_eq!(class.label(), "Powdery_Mildew");
        assert!(class.is_disease());
    }

    #[test]
    fn casing_must_match_exactly() {
        // The model's label set is case-sensitive; near-misses fall through.
        assert!(matches!(
            LeafClass::from_label("downy_mildew"),
            LeafClass::Unknown(_)
        ));
        assert!(matches!(
            LeafClass::from_label("daun sehat"),
            LeafClass::Unknown(_)
        ));
    }
}
