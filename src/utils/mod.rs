//! Utility modules: error taxonomy, metrics, logging.

pub mod error;
pub mod logging;
pub mod metrics;

pub use error::{Result, TrainError};
pub use metrics::ConfusionMatrix;
