use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use super::InferenceError;

/// Label map from the model's `config.json`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ModelLabels {
    #[serde(default)]
    id2label: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LabelCheck {
    Flower(String),
    Mismatch(String),
    Unknown,
}

impl ModelLabels {
    pub fn from_file(path: &Path) -> Result<Self, InferenceError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            InferenceError::ModelLoad(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, InferenceError> {
        serde_json::from_str(raw)
            .map_err(|e| InferenceError::ModelLoad(format!("bad model config: {}", e)))
    }

    pub fn label(&self, index: usize) -> Option<&str> {
        self.id2label.get(&index.to_string()).map(String::as_str)
    }

    pub fn check_flower_index(&self, index: usize) -> LabelCheck {
        match self.label(index) {
            Some(label) if label.to_lowercase().contains("flower") => {
                LabelCheck::Flower(label.to_string())
            }
            Some(label) => LabelCheck::Mismatch(label.to_string()),
            None => LabelCheck::Unknown,
        }
    }

    /// Logs whether `index` names a flower class. Counting still uses `index`.
    pub fn log_flower_index(labels: Option<&Self>, index: usize) {
        match labels.map(|l| l.check_flower_index(index)) {
            Some(LabelCheck::Flower(label)) => {
                log::info!("Counting class {} ({:?}) as flower", index, label)
            }
            Some(LabelCheck::Mismatch(label)) => log::warn!(
                "Class {} is labelled {:?} by the model, counting it as flower anyway",
                index,
                label
            ),
            Some(LabelCheck::Unknown) | None => log::warn!(
                "Cannot verify that class {} is the flower class: model publishes no label for it",
                index
            ),
        }
    }
}
