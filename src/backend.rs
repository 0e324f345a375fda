//! Backend Selection
//!
//! Compile-time backend choice. The default CPU backend needs no drivers and
//! runs everywhere; the `backend-wgpu` feature switches to GPU compute via
//! WGPU without touching any call sites.

#[cfg(not(feature = "backend-wgpu"))]
pub type DefaultBackend = burn::backend::NdArray<f32>;

#[cfg(feature = "backend-wgpu")]
pub type DefaultBackend = burn::backend::Wgpu;

/// Autodiff-wrapped backend used for training
pub type TrainingBackend = burn::backend::Autodiff<DefaultBackend>;
