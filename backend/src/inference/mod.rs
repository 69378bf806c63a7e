pub mod hub;
pub mod labels;
pub mod model;
pub mod pipeline;
pub mod postprocess;
pub mod preprocess;

use std::time::Duration;

use image::RgbImage;
use ndarray::Array2;

pub use pipeline::FlowerPipeline;

#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    #[error("Image could not be decoded: {0}")]
    Decode(String),
    #[error("Model unavailable: {0}")]
    ModelLoad(String),
    #[error("Unexpected model output: {0}")]
    Inference(String),
    #[error("Timed out after {0:?}")]
    Timeout(Duration),
}

impl From<tch::TchError> for InferenceError {
    fn from(err: tch::TchError) -> Self {
        InferenceError::Inference(err.to_string())
    }
}

/// An object detector reporting per-detection class logits
/// as a `detections x classes` matrix.
pub trait Detector: Send + Sync {
    fn class_logits(&self, image: &RgbImage) -> Result<Array2<f32>, InferenceError>;
}
