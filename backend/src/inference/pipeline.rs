use std::path::Path;
use std::sync::Arc;

use image::RgbImage;

use super::hub::{ModelArtifacts, ModelHub};
use super::labels::ModelLabels;
use super::model::TorchDetector;
use super::postprocess::count_flowers;
use super::preprocess::PreprocessorConfig;
use super::{Detector, InferenceError};
use crate::config::ModelConfig;

/// Shared, read-only flower counter. Clones share the same detector.
#[derive(Clone)]
pub struct FlowerPipeline {
    detector: Arc<dyn Detector>,
    flower_class_index: usize,
}

impl FlowerPipeline {
    pub fn new(detector: Arc<dyn Detector>, flower_class_index: usize) -> Self {
        Self {
            detector,
            flower_class_index,
        }
    }

    /// Downloads (or reuses) the model artefacts and loads the detector once,
    /// bounded by the configured load timeout.
    pub async fn load(config: &ModelConfig) -> Result<Self, InferenceError> {
        let timeout = config.load_timeout;
        actix_web::rt::time::timeout(timeout, Self::load_unbounded(config))
            .await
            .map_err(|_| InferenceError::Timeout(timeout))?
    }

    async fn load_unbounded(config: &ModelConfig) -> Result<Self, InferenceError> {
        let hub = ModelHub::new(&config.base_url, config.download_attempts)?;
        let artifacts = hub.resolve(config).await?;
        let flower_class_index = config.flower_class_index;

        let detector = actix_web::web::block(move || Self::build_detector(&artifacts, flower_class_index))
            .await
            .map_err(|e| InferenceError::ModelLoad(e.to_string()))??;

        Ok(Self::new(Arc::new(detector), flower_class_index))
    }

    fn build_detector(
        artifacts: &ModelArtifacts,
        flower_class_index: usize,
    ) -> Result<TorchDetector, InferenceError> {
        let labels = match &artifacts.config {
            Some(path) => match ModelLabels::from_file(path) {
                Ok(labels) => Some(labels),
                Err(e) => {
                    log::warn!("Ignoring model config: {}", e);
                    None
                }
            },
            None => None,
        };
        ModelLabels::log_flower_index(labels.as_ref(), flower_class_index);

        let preprocessor = PreprocessorConfig::from_file(&artifacts.preprocessor)?;
        TorchDetector::load(&artifacts.weights, preprocessor)
    }

    pub fn flower_class_index(&self) -> usize {
        self.flower_class_index
    }

    pub fn decode(bytes: &[u8]) -> Result<RgbImage, InferenceError> {
        image::load_from_memory(bytes)
            .map(|img| img.to_rgb8())
            .map_err(|e| InferenceError::Decode(e.to_string()))
    }

    pub fn count_in_image(&self, image: &RgbImage) -> Result<u64, InferenceError> {
        let logits = self.detector.class_logits(image)?;
        count_flowers(logits.view(), self.flower_class_index)
    }

    /// Blocking: decodes the stored image and runs one forward pass.
    pub fn count_flowers(&self, image_path: &Path) -> Result<u64, InferenceError> {
        let bytes = std::fs::read(image_path).map_err(|e| {
            InferenceError::Decode(format!("cannot read {}: {}", image_path.display(), e))
        })?;
        let image = Self::decode(&bytes)?;
        let count = self.count_in_image(&image)?;
        log::debug!("{} flowers in {}", count, image_path.display());
        Ok(count)
    }
}
