//! Run Configuration
//!
//! Training hyperparameters, resume-mode selection, and validation performed
//! before any training begins. The full configuration is embedded in the best
//! checkpoint for provenance.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::model::unet::ArchKind;
use crate::utils::error::{Result, TrainError};

/// How a run relates to previously persisted checkpoints.
///
/// One explicit mode instead of independently-set flags, so requesting two
/// conflicting resume behaviors at once is unrepresentable.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ResumeMode {
    /// Random initialization, fresh optimizer and schedule
    #[default]
    Fresh,
    /// Model parameters from the "latest" slot, fresh optimizer and schedule
    WarmStart,
    /// Full training state from the "best" slot; continues at the next epoch
    Resume,
}

/// Training configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfig {
    /// Architecture to train
    pub arch: ArchKind,

    /// Number of foreground classes; background is added internally
    pub num_classes: usize,

    /// Input image size (width and height, assumed square)
    pub image_size: usize,

    /// Number of training epochs
    pub epochs: usize,

    /// Batch size for training and validation
    pub batch_size: usize,

    /// Base learning rate
    pub learning_rate: f64,

    /// Weight decay (L2 regularization)
    pub weight_decay: f64,

    /// Linear warmup epochs at the start of the schedule (0 disables warmup)
    pub warmup_epochs: usize,

    /// Per-class loss weights (background first); None for uniform
    pub class_weights: Option<Vec<f32>>,

    /// Enable mixed-precision loss scaling
    pub amp: bool,

    /// Checkpoint relation of this run
    pub resume: ResumeMode,

    /// Random seed for epoch shuffling
    pub seed: u64,

    /// Directory for checkpoint slots
    pub checkpoint_dir: String,

    /// Directory for append-only run logs
    pub log_dir: String,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            arch: ArchKind::Unet,
            num_classes: 4,
            image_size: 224,
            epochs: 100,
            batch_size: 32,
            learning_rate: 1e-4,
            weight_decay: 1e-4,
            warmup_epochs: 0,
            class_weights: None,
            amp: false,
            resume: ResumeMode::Fresh,
            seed: 42,
            checkpoint_dir: "save_weights".to_string(),
            log_dir: "log".to_string(),
        }
    }
}

impl TrainingConfig {
    /// Total class count including background
    pub fn total_classes(&self) -> usize {
        self.num_classes + 1
    }

    /// Validate the configuration before training starts
    pub fn validate(&self) -> Result<()> {
        if self.num_classes == 0 {
            return Err(TrainError::Config(
                "num_classes must be greater than 0".to_string(),
            ));
        }

        if self.image_size == 0 || self.image_size % 4 != 0 {
            return Err(TrainError::Config(
                "image_size must be a positive multiple of 4".to_string(),
            ));
        }

        if self.epochs == 0 {
            return Err(TrainError::Config("epochs must be greater than 0".to_string()));
        }

        if self.batch_size == 0 {
            return Err(TrainError::Config(
                "batch_size must be greater than 0".to_string(),
            ));
        }

        if self.learning_rate <= 0.0 {
            return Err(TrainError::Config(
                "learning_rate must be positive".to_string(),
            ));
        }

        if self.warmup_epochs >= self.epochs {
            return Err(TrainError::Config(
                "warmup_epochs must be smaller than epochs".to_string(),
            ));
        }

        if let Some(weights) = &self.class_weights {
            if weights.len() != self.total_classes() {
                return Err(TrainError::Config(format!(
                    "class_weights needs {} entries (background included), got {}",
                    self.total_classes(),
                    weights.len()
                )));
            }
        }

        Ok(())
    }

    /// Save configuration to a JSON file
    pub fn save(&self, path: &std::path::Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| TrainError::Serialization(e.to_string()))?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load configuration from a JSON file
    pub fn load(path: &std::path::Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        serde_json::from_str(&json).map_err(|e| TrainError::Serialization(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(TrainingConfig::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_zero_classes() {
        let config = TrainingConfig {
            num_classes: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(TrainError::Config(_))));
    }

    #[test]
    fn test_rejects_unaligned_image_size() {
        let config = TrainingConfig {
            image_size: 30,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_short_class_weights() {
        let config = TrainingConfig {
            num_classes: 2,
            class_weights: Some(vec![1.0, 1.0]), // needs 3 with background
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_total_classes_adds_background() {
        let config = TrainingConfig {
            num_classes: 4,
            ..Default::default()
        };
        assert_eq!(config.total_classes(), 5);
    }

    #[test]
    fn test_json_round_trip() {
        let config = TrainingConfig {
            arch: ArchKind::UnetLite,
            epochs: 7,
            amp: true,
            ..Default::default()
        };

        let dir = std::env::temp_dir().join("rangeseg_config_test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.json");

        config.save(&path).unwrap();
        let restored = TrainingConfig::load(&path).unwrap();

        assert_eq!(restored.arch, ArchKind::UnetLite);
        assert_eq!(restored.epochs, 7);
        assert!(restored.amp);
    }
}
