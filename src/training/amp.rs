//! Dynamic Loss Scaling for Mixed-Precision Training
//!
//! Multiplies the loss by a running scale factor before backpropagation so
//! small gradients survive reduced-precision arithmetic. A non-finite scaled
//! loss backs the scale off and skips that optimizer step; after a run of
//! clean steps the scale grows again. The scaler state is part of the
//! checkpoint so a resumed run continues with the adapted scale.
//!
//! Adam-family optimizers are invariant to a uniform gradient scale (up to
//! epsilon), so no explicit gradient unscale pass is performed.

use serde::{Deserialize, Serialize};

/// Dynamic loss scaler state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LossScaler {
    /// Current loss scale factor
    pub scale: f64,
    /// Multiplier applied when the scale grows
    pub growth_factor: f64,
    /// Multiplier applied when an overflow is detected
    pub backoff_factor: f64,
    /// Number of consecutive clean steps before the scale grows
    pub growth_interval: usize,
    /// Clean steps since the last scale change
    pub steps_since_change: usize,
}

impl Default for LossScaler {
    fn default() -> Self {
        Self {
            scale: 65536.0,
            growth_factor: 2.0,
            backoff_factor: 0.5,
            growth_interval: 2000,
            steps_since_change: 0,
        }
    }
}

impl LossScaler {
    /// Create a scaler with an explicit initial scale
    pub fn with_scale(scale: f64) -> Self {
        Self {
            scale,
            ..Default::default()
        }
    }

    /// Current scale factor
    pub fn scale(&self) -> f64 {
        self.scale
    }

    /// Record a successful (finite) step; grows the scale after
    /// `growth_interval` consecutive clean steps.
    pub fn update_on_success(&mut self) {
        self.steps_since_change += 1;
        if self.steps_since_change >= self.growth_interval {
            self.scale *= self.growth_factor;
            self.steps_since_change = 0;
        }
    }

    /// Record an overflow (non-finite scaled loss); backs the scale off.
    /// The corresponding optimizer step must be skipped by the caller.
    pub fn update_on_overflow(&mut self) {
        self.scale = (self.scale * self.backoff_factor).max(1.0);
        self.steps_since_change = 0;
    }
}
