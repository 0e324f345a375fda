//! Model module: segmentation architectures and run configuration.
//!
//! The training core only depends on the model contract (image batch in,
//! per-pixel class scores out); the architectures here are the closed set of
//! variants the CLI can instantiate.

pub mod config;
pub mod unet;

pub use config::{ResumeMode, TrainingConfig};
pub use unet::{ArchKind, SegModel, SegModelConfig};
