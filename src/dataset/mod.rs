//! Dataset module: batch types and the directory loader.
//!
//! The training core consumes finite streams of [`SegBatch`] values; this
//! module produces them from in-memory [`SegItem`]s. Label masks carry one
//! class index per pixel with `IGNORE_INDEX` marking pixels excluded from
//! loss and metrics.

pub mod loader;

use burn::tensor::{backend::Backend, Int, Tensor, TensorData};

pub use loader::SegDataset;

/// One sample: CHW image data in [0, 1] plus a per-pixel label mask.
#[derive(Debug, Clone)]
pub struct SegItem {
    /// Image pixels, channel-major, length `3 * size * size`
    pub image: Vec<f32>,
    /// Label mask, length `size * size`, values are class indices or ignore
    pub mask: Vec<i64>,
    /// Square edge length
    pub size: usize,
}

/// A collated batch on backend `B`.
#[derive(Debug, Clone)]
pub struct SegBatch<B: Backend> {
    /// Images, shape `[batch, 3, size, size]`
    pub images: Tensor<B, 4>,
    /// Ground-truth labels, shape `[batch, size, size]`
    pub targets: Tensor<B, 3, Int>,
}

/// Stacks [`SegItem`]s into tensors on a target device.
#[derive(Debug, Clone)]
pub struct SegBatcher {
    image_size: usize,
}

impl SegBatcher {
    /// Create a batcher for a fixed image size
    pub fn new(image_size: usize) -> Self {
        Self { image_size }
    }

    /// Collate items into one batch. Handles short final batches; panics only
    /// on items whose size disagrees with the batcher (a loader bug).
    pub fn batch<B: Backend>(&self, items: &[SegItem], device: &B::Device) -> SegBatch<B> {
        let size = self.image_size;
        let batch = items.len();

        let mut image_data = Vec::with_capacity(batch * 3 * size * size);
        let mut mask_data = Vec::with_capacity(batch * size * size);
        for item in items {
            debug_assert_eq!(item.size, size);
            image_data.extend_from_slice(&item.image);
            mask_data.extend_from_slice(&item.mask);
        }

        let images = Tensor::from_data(
            TensorData::new(image_data, [batch, 3, size, size]),
            device,
        );
        let targets = Tensor::from_data(TensorData::new(mask_data, [batch, size, size]), device);

        SegBatch { images, targets }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type TestBackend = burn::backend::NdArray<f32>;

    fn item(size: usize, label: i64) -> SegItem {
        SegItem {
            image: vec![0.5; 3 * size * size],
            mask: vec![label; size * size],
            size,
        }
    }

    #[test]
    fn test_batch_shapes() {
        let device = Default::default();
        let batcher = SegBatcher::new(8);
        let items = vec![item(8, 0), item(8, 1), item(8, 2)];

        let batch = batcher.batch::<TestBackend>(&items, &device);
        assert_eq!(batch.images.dims(), [3, 3, 8, 8]);
        assert_eq!(batch.targets.dims(), [3, 8, 8]);
    }

    #[test]
    fn test_short_final_batch() {
        let device = Default::default();
        let batcher = SegBatcher::new(4);
        let items = vec![item(4, 1)];

        let batch = batcher.batch::<TestBackend>(&items, &device);
        assert_eq!(batch.images.dims(), [1, 3, 4, 4]);
    }
}
