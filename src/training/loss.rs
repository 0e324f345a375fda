//! Segmentation Loss
//!
//! Multi-class pixel cross-entropy with optional per-class weights and an
//! ignore sentinel. Pixels labeled `IGNORE_INDEX` contribute nothing to the
//! loss or to the normalization term. Used identically by the epoch trainer
//! and the evaluator so train/validation losses stay comparable.

use burn::tensor::{activation, backend::Backend, Int, Tensor, TensorData};

use crate::IGNORE_INDEX;

/// Masked, class-weighted cross-entropy over per-pixel logits.
///
/// `logits` has shape `[batch, num_classes, height, width]`, `targets` has
/// shape `[batch, height, width]` with one class index per pixel. Returns a
/// single-element tensor holding the mean loss over non-ignored pixels.
pub fn segmentation_cross_entropy<B: Backend>(
    logits: Tensor<B, 4>,
    targets: Tensor<B, 3, Int>,
    class_weights: Option<&[f32]>,
) -> Tensor<B, 1> {
    let device = logits.device();
    let [batch, num_classes, height, width] = logits.dims();
    let num_pixels = batch * height * width;

    // [batch, classes, h, w] -> [pixels, classes]
    let flat_logits = logits
        .permute([0, 2, 3, 1])
        .reshape([num_pixels, num_classes]);
    let flat_targets = targets.reshape([num_pixels]);

    // Ignored pixels get weight 0; their target index is clamped into range so
    // the gather below never goes out of bounds.
    let mask = flat_targets.clone().not_equal_elem(IGNORE_INDEX).float();
    let safe_targets = flat_targets.clamp(0, num_classes as i64 - 1);

    let log_probs = activation::log_softmax(flat_logits, 1);
    let gathered = log_probs.gather(1, safe_targets.clone().reshape([num_pixels, 1]));
    let nll = gathered.reshape([num_pixels]).neg();

    let pixel_weights = match class_weights {
        Some(weights) => {
            let weight_tensor = Tensor::<B, 1>::from_data(
                TensorData::new(weights.to_vec(), [weights.len()]),
                &device,
            );
            weight_tensor.select(0, safe_targets) * mask
        }
        None => mask,
    };

    // Weighted mean; eps avoids division by zero when every pixel is ignored
    let eps = Tensor::<B, 1>::from_floats([1e-8], &device);
    (nll * pixel_weights.clone()).sum() / (pixel_weights.sum() + eps)
}
