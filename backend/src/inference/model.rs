use std::path::Path;
use std::sync::Mutex;

use image::RgbImage;
use ndarray::Array2;
use tch::{CModule, Device, IValue, Kind, Tensor};

use super::preprocess::PreprocessorConfig;
use super::{Detector, InferenceError};

/// TorchScript export of the pretrained detector plus its paired preprocessor.
pub struct TorchDetector {
    module: Mutex<CModule>,
    preprocessor: PreprocessorConfig,
    device: Device,
}

impl TorchDetector {
    pub fn load(weights: &Path, preprocessor: PreprocessorConfig) -> Result<Self, InferenceError> {
        let device = Device::cuda_if_available();
        let mut module = CModule::load_on_device(weights, device).map_err(|e| {
            InferenceError::ModelLoad(format!("cannot load {}: {}", weights.display(), e))
        })?;
        module.set_eval();
        log::info!("Loaded detector {} on {:?}", weights.display(), device);
        Ok(Self {
            module: Mutex::new(module),
            preprocessor,
            device,
        })
    }

    fn forward(&self, input: Tensor) -> Result<IValue, InferenceError> {
        let module = self
            .module
            .lock()
            .map_err(|_| InferenceError::Inference("detector lock poisoned".to_string()))?;
        tch::no_grad(|| module.forward_is(&[IValue::Tensor(input)])).map_err(InferenceError::from)
    }
}

/// Finds the class logits among the shapes a traced detector may return:
/// a bare tensor, a tuple led by the logits, or a dict keyed by `logits`.
fn extract_logits(output: IValue) -> Result<Tensor, InferenceError> {
    match output {
        IValue::Tensor(tensor) => Ok(tensor),
        IValue::Tuple(items) | IValue::GenericList(items) => match items.into_iter().next() {
            Some(IValue::Tensor(tensor)) => Ok(tensor),
            _ => Err(InferenceError::Inference(
                "first output element is not a tensor".to_string(),
            )),
        },
        IValue::GenericDict(entries) => entries
            .into_iter()
            .find_map(|(key, value)| match (key, value) {
                (IValue::String(k), IValue::Tensor(t)) if k == "logits" => Some(t),
                _ => None,
            })
            .ok_or_else(|| InferenceError::Inference("output has no `logits` entry".to_string())),
        _ => Err(InferenceError::Inference(
            "unsupported detector output type".to_string(),
        )),
    }
}

/// Converts `[1, detections, classes]` or `[detections, classes]` to a matrix.
fn logits_to_array(logits: &Tensor) -> Result<Array2<f32>, InferenceError> {
    let shape = logits.size();
    let (detections, classes) = match shape.as_slice() {
        [1, d, c] | [d, c] => (*d as usize, *c as usize),
        other => {
            return Err(InferenceError::Inference(format!(
                "expected logits of shape [1, detections, classes], got {:?}",
                other
            )));
        }
    };

    let flat = logits
        .to_device(Device::Cpu)
        .to_kind(Kind::Float)
        .contiguous()
        .view([-1]);
    let numel = detections * classes;
    let mut values = vec![0.0f32; numel];
    flat.f_copy_data(&mut values, numel)?;
    Array2::from_shape_vec((detections, classes), values)
        .map_err(|e| InferenceError::Inference(e.to_string()))
}

impl Detector for TorchDetector {
    fn class_logits(&self, image: &RgbImage) -> Result<Array2<f32>, InferenceError> {
        let pixels = self.preprocessor.apply(image);
        let dims: Vec<i64> = pixels.shape().iter().map(|&d| d as i64).collect();
        let data = pixels
            .as_slice()
            .ok_or_else(|| InferenceError::Inference("pixel buffer not contiguous".to_string()))?;
        let input = Tensor::from_slice(data).view(dims.as_slice()).to_device(self.device);

        let output = self.forward(input)?;
        logits_to_array(&extract_logits(output)?)
    }
}
