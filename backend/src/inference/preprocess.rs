use std::path::Path;

use image::RgbImage;
use image::imageops::{self, FilterType};
use ndarray::Array4;
use serde::Deserialize;

use super::InferenceError;

const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct SizeConfig {
    pub shortest_edge: Option<u32>,
    pub longest_edge: Option<u32>,
    pub height: Option<u32>,
    pub width: Option<u32>,
}

/// Older configs publish `"size": 800` with a separate `max_size`.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum SizeSpec {
    Edge(u32),
    Dims(SizeConfig),
}

/// Image processor settings as published next to the model weights
/// (`preprocessor_config.json`).
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct PreprocessorConfig {
    pub do_resize: bool,
    pub size: SizeSpec,
    pub max_size: Option<u32>,
    pub do_rescale: bool,
    pub rescale_factor: f32,
    pub do_normalize: bool,
    pub image_mean: [f32; 3],
    pub image_std: [f32; 3],
}

impl Default for PreprocessorConfig {
    fn default() -> Self {
        Self {
            do_resize: true,
            size: SizeSpec::Dims(SizeConfig {
                shortest_edge: Some(800),
                longest_edge: Some(1333),
                height: None,
                width: None,
            }),
            max_size: None,
            do_rescale: true,
            rescale_factor: 1.0 / 255.0,
            do_normalize: true,
            image_mean: IMAGENET_MEAN,
            image_std: IMAGENET_STD,
        }
    }
}

impl PreprocessorConfig {
    pub fn from_file(path: &Path) -> Result<Self, InferenceError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            InferenceError::ModelLoad(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, InferenceError> {
        let config: Self = serde_json::from_str(raw)
            .map_err(|e| InferenceError::ModelLoad(format!("bad preprocessor config: {}", e)))?;
        if config.image_std.iter().any(|s| *s == 0.0) {
            return Err(InferenceError::ModelLoad(
                "preprocessor config has a zero image_std".to_string(),
            ));
        }
        Ok(config)
    }

    fn resolved_size(&self) -> SizeConfig {
        match &self.size {
            SizeSpec::Edge(edge) => SizeConfig {
                shortest_edge: Some(*edge),
                longest_edge: self.max_size,
                ..SizeConfig::default()
            },
            SizeSpec::Dims(dims) => dims.clone(),
        }
    }

    /// Output size `(width, height)` for an input of `width x height`.
    pub fn target_size(&self, width: u32, height: u32) -> (u32, u32) {
        if !self.do_resize {
            return (width, height);
        }
        let size = self.resolved_size();
        if let (Some(h), Some(w)) = (size.height, size.width) {
            return (w, h);
        }

        let Some(shortest) = size.shortest_edge else {
            return (width, height);
        };
        let (short, long) = (width.min(height) as f64, width.max(height) as f64);
        let mut edge = shortest as f64;
        if let Some(longest) = size.longest_edge {
            if long / short * edge > longest as f64 {
                edge = (longest as f64 * short / long).round();
            }
        }
        // short edge lands on `edge`, long edge is truncated like the HF processor
        let edge = (edge as u32).max(1);
        let stretched = ((edge as f64 * long / short).floor() as u32).max(1);
        if width < height {
            (edge, stretched)
        } else {
            (stretched, edge)
        }
    }

    /// Builds the `[1, 3, H, W]` pixel tensor the detector expects.
    pub fn apply(&self, image: &RgbImage) -> Array4<f32> {
        let (width, height) = self.target_size(image.width(), image.height());
        let resized;
        let source = if (width, height) == image.dimensions() {
            image
        } else {
            resized = imageops::resize(image, width, height, FilterType::Triangle);
            &resized
        };

        let rescale = if self.do_rescale { self.rescale_factor } else { 1.0 };
        let mut pixels = Array4::<f32>::zeros((1, 3, height as usize, width as usize));
        for (x, y, pixel) in source.enumerate_pixels() {
            for c in 0..3 {
                let mut value = pixel[c] as f32 * rescale;
                if self.do_normalize {
                    value = (value - self.image_mean[c]) / self.image_std[c];
                }
                pixels[[0, c, y as usize, x as usize]] = value;
            }
        }
        pixels
    }
}
