//! Learning Rate Schedule
//!
//! Per-step schedule: optional linear warmup followed by polynomial decay,
//! stepped once per training batch (not once per epoch). The whole struct is
//! serde-serializable; restoring the step counter from a checkpoint and
//! replaying forward reproduces the exact multiplier sequence of an
//! uninterrupted run.

use serde::{Deserialize, Serialize};

/// Default polynomial decay exponent
pub const DEFAULT_POWER: f64 = 0.9;

/// Multiplier at the first warmup step
pub const DEFAULT_WARMUP_FACTOR: f64 = 1e-3;

/// Lower clamp so the multiplier stays in (0, 1]
pub const MULTIPLIER_FLOOR: f64 = 1e-6;

/// Warmup + polynomial-decay learning rate schedule.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PolyWarmupSchedule {
    /// Base learning rate the multiplier applies to
    pub base_lr: f64,
    /// Total steps = batches per epoch * epochs
    pub total_steps: usize,
    /// Steps spent in linear warmup (0 disables warmup)
    pub warmup_steps: usize,
    /// Multiplier at warmup step 0
    pub warmup_factor: f64,
    /// Polynomial decay exponent
    pub power: f64,
    /// Current step counter (advanced once per training batch)
    pub step: usize,
}

impl PolyWarmupSchedule {
    /// Create a schedule for a full run.
    ///
    /// `warmup_epochs` is converted to steps using `steps_per_epoch`; pass 0 to
    /// disable warmup.
    pub fn new(base_lr: f64, steps_per_epoch: usize, epochs: usize, warmup_epochs: usize) -> Self {
        Self {
            base_lr,
            total_steps: steps_per_epoch * epochs,
            warmup_steps: steps_per_epoch * warmup_epochs,
            warmup_factor: DEFAULT_WARMUP_FACTOR,
            power: DEFAULT_POWER,
            step: 0,
        }
    }

    /// Pure multiplier function of the step index; always in (0, 1].
    pub fn multiplier_at(&self, step: usize) -> f64 {
        if self.warmup_steps > 0 && step < self.warmup_steps {
            // Linear ramp from warmup_factor to 1.0
            let alpha = step as f64 / self.warmup_steps as f64;
            self.warmup_factor * (1.0 - alpha) + alpha
        } else {
            let decay_steps = self.total_steps.saturating_sub(self.warmup_steps).max(1);
            let progress =
                step.saturating_sub(self.warmup_steps) as f64 / decay_steps as f64;
            (1.0 - progress.min(1.0)).powf(self.power).max(MULTIPLIER_FLOOR)
        }
    }

    /// Learning rate for the current step
    pub fn lr(&self) -> f64 {
        self.base_lr * self.multiplier_at(self.step)
    }

    /// Advance the step counter by one training batch
    pub fn advance(&mut self) {
        self.step += 1;
    }

    /// Restore the persisted step counter when resuming
    pub fn restore_step(&mut self, step: usize) {
        self.step = step;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_warmup_ramps_up() {
        let sched = PolyWarmupSchedule::new(0.1, 10, 10, 1);

        let m0 = sched.multiplier_at(0);
        let m5 = sched.multiplier_at(5);
        let m9 = sched.multiplier_at(9);

        assert!((m0 - DEFAULT_WARMUP_FACTOR).abs() < 1e-12);
        assert!(m0 < m5 && m5 < m9);
        assert!(m9 <= 1.0);
    }

    #[test]
    fn test_decay_is_monotonic_after_warmup() {
        let sched = PolyWarmupSchedule::new(0.1, 10, 10, 1);

        let mut prev = sched.multiplier_at(10);
        assert!((prev - 1.0).abs() < 1e-12); // full rate at the end of warmup
        for step in 11..100 {
            let m = sched.multiplier_at(step);
            assert!(m <= prev);
            prev = m;
        }
    }

    #[test]
    fn test_multiplier_in_half_open_unit_interval() {
        let sched = PolyWarmupSchedule::new(1e-4, 25, 4, 0);
        for step in 0..=sched.total_steps {
            let m = sched.multiplier_at(step);
            assert!(m > 0.0 && m <= 1.0, "step {}: {}", step, m);
        }
    }

    #[test]
    fn test_resume_reproduces_sequence() {
        let steps_per_epoch = 7;
        let epochs = 5;

        let mut fresh = PolyWarmupSchedule::new(0.05, steps_per_epoch, epochs, 1);
        let mut one_pass = Vec::new();
        for _ in 0..fresh.total_steps {
            one_pass.push(fresh.lr());
            fresh.advance();
        }

        // Interrupt at an arbitrary step and resume from the persisted counter
        let resume_at = 13;
        let mut resumed = PolyWarmupSchedule::new(0.05, steps_per_epoch, epochs, 1);
        resumed.restore_step(resume_at);
        for (i, expected) in one_pass.iter().enumerate().skip(resume_at) {
            assert_eq!(resumed.lr(), *expected, "mismatch at step {}", i);
            resumed.advance();
        }
    }

    #[test]
    fn test_serde_round_trip() {
        let mut sched = PolyWarmupSchedule::new(0.01, 12, 8, 1);
        for _ in 0..30 {
            sched.advance();
        }

        let json = serde_json::to_string(&sched).unwrap();
        let restored: PolyWarmupSchedule = serde_json::from_str(&json).unwrap();
        assert_eq!(sched, restored);
        assert_eq!(sched.lr(), restored.lr());
    }

    #[test]
    fn test_no_warmup_starts_at_full_rate() {
        let sched = PolyWarmupSchedule::new(0.1, 10, 10, 0);
        assert!((sched.multiplier_at(0) - 1.0).abs() < 1e-12);
    }
}
