use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read detector config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse detector config: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("detector config has no class names")]
    EmptyClassList,
}

/// Detector settings loaded from `config/detector.yaml`.
///
/// `class_names` must match the exported model's class order; the label
/// strings are what `shared::LeafClass::from_label` sees.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorConfig {
    pub model_path: String,
    #[serde(default = "default_input_size")]
    pub input_size: u32,
    #[serde(default = "default_iou_threshold")]
    pub iou_threshold: f32,
    #[serde(default = "default_input_name")]
    pub input_name: String,
    pub class_names: Vec<String>,
    /// Optional TTF used to burn label text into annotated images.
    /// Without it, annotation degrades to boxes only.
    #[serde(default)]
    pub label_font: Option<String>,
}

fn default_input_size() -> u32 {
    640
}

fn default_iou_threshold() -> f32 {
    0.45
}

fn default_input_name() -> String {
    "images".to_string()
}

impl DetectorConfig {
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let config_str = std::fs::read_to_string(path)?;
        let config: DetectorConfig = serde_yaml::from_str(&config_str)?;
        if config.class_names.is_empty() {
            return Err(ConfigError::EmptyClassList);
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_yaml_with_defaults() {
        let yaml = "model_path: models/best.onnx\nclass_names:\n  - Daun Sehat\n  - Downy_Mildew\n  - Virus_Gemini\n";
        let config: DetectorConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.input_size, 640);
        assert_eq!(config.input_name, "images");
        assert!((config.iou_threshold - 0.45).abs() < 1e-6);
        assert_eq!(config.class_names.len(), 3);
        assert!(config.label_font.is_none());
    }
}
