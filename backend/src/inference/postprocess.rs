use ndarray::{Array2, ArrayView2, Axis};

use super::InferenceError;

/// Row-wise softmax over the class axis.
pub fn softmax(logits: ArrayView2<'_, f32>) -> Array2<f32> {
    let mut probabilities = logits.to_owned();
    for mut row in probabilities.axis_iter_mut(Axis(0)) {
        let max = row.fold(f32::NEG_INFINITY, |acc, &v| acc.max(v));
        row.mapv_inplace(|v| (v - max).exp());
        let sum = row.sum();
        if sum > 0.0 {
            row.mapv_inplace(|v| v / sum);
        }
    }
    probabilities
}

/// Index of the largest value; ties go to the lowest index.
fn argmax(row: ndarray::ArrayView1<'_, f32>) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (idx, &value) in row.iter().enumerate() {
        match best {
            Some((_, current)) if value <= current => {}
            _ => best = Some((idx, value)),
        }
    }
    best.map(|(idx, _)| idx)
}

/// Number of detections whose most probable class is `flower_class_index`.
pub fn count_flowers(
    logits: ArrayView2<'_, f32>,
    flower_class_index: usize,
) -> Result<u64, InferenceError> {
    let (detections, classes) = logits.dim();
    if detections == 0 {
        return Ok(0);
    }
    if classes == 0 {
        return Err(InferenceError::Inference(
            "model produced detections with no classes".to_string(),
        ));
    }
    if flower_class_index >= classes {
        return Err(InferenceError::Inference(format!(
            "flower class index {} out of range for {} classes",
            flower_class_index, classes
        )));
    }
    if logits.iter().any(|v| !v.is_finite()) {
        return Err(InferenceError::Inference(
            "model produced non-finite logits".to_string(),
        ));
    }

    let probabilities = softmax(logits);
    let count = probabilities
        .axis_iter(Axis(0))
        .filter(|row| argmax(row.view()) == Some(flower_class_index))
        .count();
    Ok(count as u64)
}
