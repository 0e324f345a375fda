//! Dataset Loader
//!
//! Loads paired image/mask samples from disk. Expected layout:
//!
//! ```text
//! <root>/<split>/images/<stem>.<ext>
//! <root>/<split>/masks/<stem>.png
//! ```
//!
//! Masks are grayscale with one class index per pixel; 255 is the ignore
//! sentinel. Masks are resized with nearest-neighbor so label values are
//! never interpolated.

use std::path::{Path, PathBuf};

use image::imageops::FilterType;
use tracing::info;

use super::SegItem;
use crate::utils::error::{Result, TrainError};

/// An on-disk segmentation split, loaded eagerly into memory.
pub struct SegDataset {
    items: Vec<SegItem>,
}

impl SegDataset {
    /// Load every image/mask pair under `<root>/<split>`.
    pub fn load(root: &Path, split: &str, image_size: usize) -> Result<Self> {
        let image_dir = root.join(split).join("images");
        let mask_dir = root.join(split).join("masks");

        if !image_dir.is_dir() {
            return Err(TrainError::Dataset(format!(
                "image directory not found: {}",
                image_dir.display()
            )));
        }

        let mut paths: Vec<PathBuf> = std::fs::read_dir(&image_dir)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_file())
            .collect();
        paths.sort();

        let mut items = Vec::with_capacity(paths.len());
        for image_path in &paths {
            let stem = image_path
                .file_stem()
                .and_then(|s| s.to_str())
                .ok_or_else(|| {
                    TrainError::Dataset(format!("bad file name: {}", image_path.display()))
                })?;
            let mask_path = mask_dir.join(format!("{}.png", stem));
            if !mask_path.is_file() {
                return Err(TrainError::Dataset(format!(
                    "missing mask for {}: expected {}",
                    image_path.display(),
                    mask_path.display()
                )));
            }
            items.push(load_pair(image_path, &mask_path, image_size)?);
        }

        info!(
            "Loaded {} samples from {}/{}",
            items.len(),
            root.display(),
            split
        );

        Ok(Self { items })
    }

    /// All loaded samples
    pub fn items(&self) -> &[SegItem] {
        &self.items
    }

    /// Number of samples
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the split is empty
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

fn load_pair(image_path: &Path, mask_path: &Path, size: usize) -> Result<SegItem> {
    let image = image::open(image_path)
        .map_err(|e| TrainError::Dataset(format!("{}: {}", image_path.display(), e)))?
        .resize_exact(size as u32, size as u32, FilterType::Triangle)
        .to_rgb8();

    let mask = image::open(mask_path)
        .map_err(|e| TrainError::Dataset(format!("{}: {}", mask_path.display(), e)))?
        .resize_exact(size as u32, size as u32, FilterType::Nearest)
        .to_luma8();

    // HWC u8 -> CHW f32 in [0, 1]
    let mut image_data = vec![0.0f32; 3 * size * size];
    for (x, y, pixel) in image.enumerate_pixels() {
        let spatial = y as usize * size + x as usize;
        for c in 0..3 {
            image_data[c * size * size + spatial] = pixel.0[c] as f32 / 255.0;
        }
    }

    let mask_data: Vec<i64> = mask.pixels().map(|p| p.0[0] as i64).collect();

    Ok(SegItem {
        image: image_data,
        mask: mask_data,
        size,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, RgbImage};

    fn write_sample(root: &Path, split: &str, stem: &str, size: u32) {
        let image_dir = root.join(split).join("images");
        let mask_dir = root.join(split).join("masks");
        std::fs::create_dir_all(&image_dir).unwrap();
        std::fs::create_dir_all(&mask_dir).unwrap();

        let image = RgbImage::from_fn(size, size, |x, _| image::Rgb([x as u8, 0, 255]));
        image.save(image_dir.join(format!("{}.png", stem))).unwrap();

        let mask = GrayImage::from_fn(size, size, |x, y| {
            image::Luma([if x + y < size { 0 } else { 1 }])
        });
        mask.save(mask_dir.join(format!("{}.png", stem))).unwrap();
    }

    #[test]
    fn test_load_pairs() {
        let root = std::env::temp_dir().join("rangeseg_loader_test");
        let _ = std::fs::remove_dir_all(&root);
        write_sample(&root, "train", "a", 8);
        write_sample(&root, "train", "b", 8);

        let dataset = SegDataset::load(&root, "train", 8).unwrap();
        assert_eq!(dataset.len(), 2);

        let item = &dataset.items()[0];
        assert_eq!(item.image.len(), 3 * 8 * 8);
        assert_eq!(item.mask.len(), 8 * 8);
        assert!(item.image.iter().all(|v| (0.0..=1.0).contains(v)));
        assert!(item.mask.iter().all(|&v| v == 0 || v == 1));
    }

    #[test]
    fn test_missing_directory_is_dataset_error() {
        let root = std::env::temp_dir().join("rangeseg_loader_missing");
        let result = SegDataset::load(&root, "train", 8);
        assert!(matches!(result, Err(TrainError::Dataset(_))));
    }

    #[test]
    fn test_missing_mask_is_dataset_error() {
        let root = std::env::temp_dir().join("rangeseg_loader_nomask");
        let _ = std::fs::remove_dir_all(&root);
        let image_dir = root.join("train").join("images");
        std::fs::create_dir_all(&image_dir).unwrap();
        RgbImage::from_pixel(4, 4, image::Rgb([1, 2, 3]))
            .save(image_dir.join("x.png"))
            .unwrap();

        let result = SegDataset::load(&root, "train", 4);
        assert!(matches!(result, Err(TrainError::Dataset(_))));
    }
}
