//! rangeseg: semantic segmentation training engine built on Burn.
//!
//! Trains compact UNet variants for per-pixel classification with a per-step
//! warmup/polynomial learning rate schedule, confusion-matrix validation
//! metrics, optional dynamic loss scaling, and a two-slot checkpoint layout
//! (latest for warm starts, best for full resumption).
//!
//! Entry points: [`training::run_training`] for the epoch loop and
//! [`training::run_evaluation`] for scoring the best checkpoint on a split.

pub mod backend;
pub mod dataset;
pub mod model;
pub mod training;
pub mod utils;

/// Mask label excluded from loss and metrics
pub const IGNORE_INDEX: i64 = 255;

pub use backend::{DefaultBackend, TrainingBackend};
pub use model::{ArchKind, ResumeMode, SegModel, TrainingConfig};
pub use training::{run_evaluation, run_training, RunSummary};
pub use utils::{ConfusionMatrix, Result, TrainError};
