//! Error Handling Module
//!
//! Defines the error taxonomy for the training engine.
//! Uses thiserror for ergonomic error definitions.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for rangeseg operations
#[derive(Error, Debug)]
pub enum TrainError {
    /// Invalid option combination detected before training begins
    #[error("Configuration error: {0}")]
    Config(String),

    /// A checkpoint slot exists but cannot be restored into a valid training state
    #[error("Corrupt checkpoint at '{0}': {1}")]
    CorruptCheckpoint(PathBuf, String),

    /// Loss became non-finite during a training step
    #[error("Non-finite loss at epoch {epoch}, batch {batch}")]
    NumericInstability { epoch: usize, batch: usize },

    /// A data stream yielded no batches for an epoch
    #[error("Data stream yielded no batches for epoch {0}")]
    DataExhaustion(usize),

    /// Error with dataset loading
    #[error("Dataset error: {0}")]
    Dataset(String),

    /// Error with model operations (save/load/forward)
    #[error("Model error: {0}")]
    Model(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Convenience Result type for rangeseg operations
pub type Result<T> = std::result::Result<T, TrainError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TrainError::Config("unknown architecture".to_string());
        assert_eq!(format!("{}", err), "Configuration error: unknown architecture");
    }

    #[test]
    fn test_corrupt_checkpoint_display() {
        let err = TrainError::CorruptCheckpoint(
            PathBuf::from("save_weights/unet_best_state.json"),
            "missing field `epoch`".to_string(),
        );
        assert!(format!("{}", err).contains("unet_best_state.json"));
    }

    #[test]
    fn test_numeric_instability_display() {
        let err = TrainError::NumericInstability { epoch: 3, batch: 17 };
        assert_eq!(format!("{}", err), "Non-finite loss at epoch 3, batch 17");
    }
}
