use lazy_static::lazy_static;
use std::collections::{HashMap, HashSet};
use strum::IntoEnumIterator;

use shared::DiseaseKind;

/// Shown when disease candidates qualified but none of them has a dedicated
/// advisory sentence.
pub const GENERIC_ADVISORY: &str =
    "Beberapa penyakit tidak terdeteksi. Mohon konsultasi dengan ahli pertanian.";

/// Shown when nothing at all met the confidence threshold.
pub const NOT_DETECTED_ADVISORY: &str = "Tidak ada penyakit yang terdeteksi pada daun melon \
     ini pada tingkat keyakinan yang ditentukan. Daun mungkin sehat atau penyakit belum dapat \
     terdeteksi.";

/// Shown in place of a diagnosis when the model never loaded.
pub const MODEL_UNAVAILABLE_ADVISORY: &str =
    "Model deteksi tidak tersedia. Silakan hubungi administrator.";

lazy_static! {
    static ref ADVISORIES: HashMap<DiseaseKind, &'static str> = {
        let mut m = HashMap::new();
        m.insert(
            DiseaseKind::DownyMildew,
            "Untuk embun bulu, pastikan drainase yang baik dan pertimbangkan fungisida yang tepat.",
        );
        m.insert(
            DiseaseKind::GeminiVirus,
            "Virus Gemini sulit diobati; fokus pada pengendalian vektor (kutu kebul) dan \
             pemusnahan tanaman terinfeksi.",
        );
        m
    };
}

/// Concatenate the advisory sentences for every recognized disease present,
/// in enumeration order (not detection order). Falls back to the generic
/// consult-an-expert message when nothing in the set is recognized.
pub fn build_advisory(seen: &HashSet<DiseaseKind>) -> String {
    let sentences: Vec<&str> = DiseaseKind::iter()
        .filter(|kind| seen.contains(kind))
        .filter_map(|kind| ADVISORIES.get(&kind).copied())
        .collect();

    if sentences.is_empty() {
        GENERIC_ADVISORY.to_string()
    } else {
        sentences.join(" ")
    }
}
