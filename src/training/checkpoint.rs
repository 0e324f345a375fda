//! Checkpoint Manager
//!
//! Owns the two durable slots:
//!
//! - `"latest"` — model parameters only, overwritten unconditionally every
//!   epoch (cheap warm-start material),
//! - `"best"` — model + optimizer records plus a [`TrainingSnapshot`] JSON,
//!   overwritten only when the best-score predicate holds.
//!
//! Records use Burn's `BinFileRecorder` at full precision so a reloaded model
//! resumes bit-identical training. Every artifact is written to a temporary
//! stem and then renamed, so an interrupted write never leaves a slot that
//! looks complete but is not.

use std::path::{Path, PathBuf};

use burn::module::Module;
use burn::optim::Optimizer;
use burn::record::{BinFileRecorder, FullPrecisionSettings, Recorder};
use burn::tensor::backend::{AutodiffBackend, Backend};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::model::{ArchKind, SegModel, TrainingConfig};
use crate::training::amp::LossScaler;
use crate::utils::error::{Result, TrainError};

type FullRecorder = BinFileRecorder<FullPrecisionSettings>;

/// The serializable part of the joint training state.
///
/// Together with the model and optimizer records this is everything needed to
/// continue a run without repeating or skipping schedule steps. `epoch` is the
/// last *completed* epoch; resumption continues at `epoch + 1`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingSnapshot {
    /// Last completed epoch (1-based)
    pub epoch: usize,
    /// Schedule step counter at the end of that epoch
    pub schedule_step: usize,
    /// Best validation mean IoU so far
    pub best_score: f64,
    /// Epoch that achieved the best score
    pub best_epoch: usize,
    /// Dice score at the best epoch
    pub best_dice: f64,
    /// Loss scaler state when mixed precision is enabled
    pub scaler: Option<LossScaler>,
    /// Full run configuration, for provenance
    pub config: TrainingConfig,
}

/// Exclusive owner of checkpoint reads and writes.
pub struct CheckpointManager {
    dir: PathBuf,
    arch: ArchKind,
}

impl CheckpointManager {
    /// Create a manager rooted at `dir`, creating the directory if needed
    pub fn new(dir: impl Into<PathBuf>, arch: ArchKind) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir, arch })
    }

    fn stem(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}_{}", self.arch.slug(), name))
    }

    fn record_path(stem: &Path) -> PathBuf {
        let mut path = stem.to_path_buf();
        path.set_extension("bin");
        path
    }

    /// Path of the best-slot snapshot JSON
    pub fn best_state_path(&self) -> PathBuf {
        self.stem("best_state.json")
    }

    /// Overwrite the "latest" slot with just the model parameters.
    pub fn save_latest<B: Backend>(&self, model: &SegModel<B>) -> Result<()> {
        let stem = self.stem("latest_model");
        self.record_model(model, &stem)?;
        Ok(())
    }

    /// Overwrite the "best" slot with the full training state.
    pub fn save_best<B, O>(
        &self,
        model: &SegModel<B>,
        optimizer: &O,
        snapshot: &TrainingSnapshot,
    ) -> Result<()>
    where
        B: AutodiffBackend,
        O: Optimizer<SegModel<B>, B>,
    {
        self.record_model(model, &self.stem("best_model"))?;

        let optim_stem = self.stem("best_optim");
        let optim_tmp = self.stem("best_optim_tmp");
        let recorder = FullRecorder::new();
        recorder
            .record(optimizer.to_record(), optim_tmp.clone())
            .map_err(|e| TrainError::Model(format!("failed to save optimizer: {:?}", e)))?;
        std::fs::rename(Self::record_path(&optim_tmp), Self::record_path(&optim_stem))?;

        let state_path = self.best_state_path();
        let state_tmp = state_path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(snapshot)
            .map_err(|e| TrainError::Serialization(e.to_string()))?;
        std::fs::write(&state_tmp, json)?;
        std::fs::rename(&state_tmp, &state_path)?;

        info!(
            "Saved best checkpoint (epoch {}, mIoU {:.4})",
            snapshot.epoch, snapshot.best_score
        );

        Ok(())
    }

    /// Load model parameters from the "latest" slot (warm start).
    pub fn load_latest_model<B: Backend>(
        &self,
        model: SegModel<B>,
        device: &B::Device,
    ) -> Result<SegModel<B>> {
        let stem = self.stem("latest_model");
        self.load_model(model, &stem, device)
    }

    /// Load the full training state from the "best" slot.
    pub fn load_best<B, O>(
        &self,
        model: SegModel<B>,
        optimizer: O,
        device: &B::Device,
    ) -> Result<(SegModel<B>, O, TrainingSnapshot)>
    where
        B: AutodiffBackend,
        O: Optimizer<SegModel<B>, B>,
    {
        let state_path = self.best_state_path();
        if !state_path.is_file() {
            return Err(TrainError::CorruptCheckpoint(
                state_path,
                "snapshot file missing".to_string(),
            ));
        }
        let json = std::fs::read_to_string(&state_path)?;
        let snapshot: TrainingSnapshot = serde_json::from_str(&json)
            .map_err(|e| TrainError::CorruptCheckpoint(state_path.clone(), e.to_string()))?;

        let model = self.load_model(model, &self.stem("best_model"), device)?;

        let optim_stem = self.stem("best_optim");
        let optim_path = Self::record_path(&optim_stem);
        if !optim_path.is_file() {
            return Err(TrainError::CorruptCheckpoint(
                optim_path,
                "optimizer record missing".to_string(),
            ));
        }
        let recorder = FullRecorder::new();
        let record = recorder
            .load(optim_stem, device)
            .map_err(|e| TrainError::CorruptCheckpoint(optim_path, format!("{:?}", e)))?;
        let optimizer = optimizer.load_record(record);

        info!(
            "Restored best checkpoint (epoch {}, mIoU {:.4})",
            snapshot.epoch, snapshot.best_score
        );

        Ok((model, optimizer, snapshot))
    }

    fn record_model<B: Backend>(&self, model: &SegModel<B>, stem: &Path) -> Result<()> {
        let tmp_stem = stem.with_file_name(format!(
            "{}_tmp",
            stem.file_name().and_then(|n| n.to_str()).unwrap_or("model")
        ));
        let recorder = FullRecorder::new();
        model
            .clone()
            .save_file(tmp_stem.clone(), &recorder)
            .map_err(|e| TrainError::Model(format!("failed to save model: {:?}", e)))?;
        std::fs::rename(Self::record_path(&tmp_stem), Self::record_path(stem))?;
        Ok(())
    }

    fn load_model<B: Backend>(
        &self,
        model: SegModel<B>,
        stem: &Path,
        device: &B::Device,
    ) -> Result<SegModel<B>> {
        let path = Self::record_path(stem);
        if !path.is_file() {
            return Err(TrainError::CorruptCheckpoint(
                path,
                "model record missing".to_string(),
            ));
        }
        let recorder = FullRecorder::new();
        model
            .load_file(stem.to_path_buf(), &recorder, device)
            .map_err(|e| TrainError::CorruptCheckpoint(path, format!("{:?}", e)))
    }
}
