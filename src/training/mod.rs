//! Training module: the per-epoch engine and everything it owns.
//!
//! `run` drives the epoch cycle; `trainer` performs single train/eval passes;
//! `scheduler`, `amp`, `loss`, and `checkpoint` are the moving parts the
//! trainer and orchestrator compose.

pub mod amp;
pub mod checkpoint;
pub mod loss;
pub mod run;
pub mod scheduler;
pub mod trainer;

pub use amp::LossScaler;
pub use checkpoint::{CheckpointManager, TrainingSnapshot};
pub use run::{run_evaluation, run_training, EpochRecord, RunSummary};
pub use scheduler::PolyWarmupSchedule;
pub use trainer::{BestTracker, EvalReport, TrainEpochStats, Trainer};
