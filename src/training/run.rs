//! Run Orchestrator
//!
//! Drives the per-epoch cycle: shuffled training pass, evaluation pass,
//! checkpoint updates, and the append-only run log. Epochs are 1-based in
//! every log line and checkpoint field.
//!
//! Checkpoint policy per completed epoch: the "latest" slot is overwritten
//! unconditionally, then the "best" slot is overwritten only when the epoch's
//! validation mean IoU ties or beats the best seen so far.

use std::io::Write;
use std::path::{Path, PathBuf};

use burn::optim::decay::WeightDecayConfig;
use burn::optim::AdamConfig;
use burn::tensor::backend::{AutodiffBackend, Backend};
use chrono::Local;
use colored::Colorize;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::info;

use crate::dataset::{SegBatcher, SegDataset, SegItem};
use crate::model::{ResumeMode, SegModel, TrainingConfig};
use crate::training::amp::LossScaler;
use crate::training::checkpoint::{CheckpointManager, TrainingSnapshot};
use crate::training::scheduler::PolyWarmupSchedule;
use crate::training::trainer::{BestTracker, EvalReport, TrainEpochStats, Trainer};
use crate::utils::error::{Result, TrainError};

/// One row of the per-epoch history
#[derive(Debug, Clone)]
pub struct EpochRecord {
    pub epoch: usize,
    pub train_loss: f64,
    pub val_loss: f64,
    pub mean_iou: f64,
    pub dice: f64,
    pub lr: f64,
    pub is_best: bool,
}

/// Final result of a training run
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub epochs_run: usize,
    pub best_epoch: usize,
    pub best_score: f64,
    pub best_dice: f64,
    pub history: Vec<EpochRecord>,
    pub log_path: PathBuf,
}

/// Run the full training loop described by `config` on data under `data_root`.
///
/// Expects `<data_root>/train` and `<data_root>/val` splits in the layout of
/// [`SegDataset`]. Returns after the configured number of epochs or on the
/// first unrecoverable error; partial progress up to the last completed epoch
/// survives in the checkpoint slots either way.
pub fn run_training<B: AutodiffBackend>(
    config: &TrainingConfig,
    data_root: &Path,
) -> Result<RunSummary> {
    config.validate()?;

    let started = Local::now();
    let device = B::Device::default();
    let inner_device = <B::InnerBackend as Backend>::Device::default();

    let train = SegDataset::load(data_root, "train", config.image_size)?;
    let val = SegDataset::load(data_root, "val", config.image_size)?;
    if train.is_empty() {
        return Err(TrainError::Dataset("training split is empty".to_string()));
    }
    if val.is_empty() {
        return Err(TrainError::Dataset("validation split is empty".to_string()));
    }

    let steps_per_epoch = train.len().div_ceil(config.batch_size);
    let total_classes = config.total_classes();

    let model_config = config.arch.model_config(total_classes, 3);
    let mut model = SegModel::<B>::new(&model_config, &device);
    let mut optimizer = AdamConfig::new()
        .with_weight_decay(Some(WeightDecayConfig::new(config.weight_decay as f32)))
        .init();
    let mut schedule = PolyWarmupSchedule::new(
        config.learning_rate,
        steps_per_epoch,
        config.epochs,
        config.warmup_epochs,
    );
    let mut scaler = config.amp.then(LossScaler::default);
    let mut tracker = BestTracker::new();
    let mut start_epoch = 1;

    let checkpoints = CheckpointManager::new(&config.checkpoint_dir, config.arch)?;

    match config.resume {
        ResumeMode::Fresh => {}
        ResumeMode::WarmStart => {
            model = checkpoints.load_latest_model(model, &device)?;
            info!("Warm start: loaded model parameters from the latest slot");
        }
        ResumeMode::Resume => {
            let (restored_model, restored_optimizer, snapshot) =
                checkpoints.load_best(model, optimizer, &device)?;
            model = restored_model;
            optimizer = restored_optimizer;
            schedule.restore_step(snapshot.schedule_step);
            if config.amp {
                scaler = snapshot.scaler.clone().or(scaler);
            }
            tracker = BestTracker::restore(
                snapshot.best_score,
                snapshot.best_epoch,
                snapshot.best_dice,
            );
            start_epoch = snapshot.epoch + 1;
            info!("Resuming after epoch {}", snapshot.epoch);
        }
    }

    if start_epoch > config.epochs {
        return Err(TrainError::Config(format!(
            "checkpoint already covers all {} epochs",
            config.epochs
        )));
    }

    let mut trainer = Trainer::new(
        model,
        optimizer,
        schedule,
        scaler,
        config.class_weights.clone(),
    );

    let mut log = RunLog::create(&config.log_dir, config.arch.slug(), config)?;
    let batcher = SegBatcher::new(config.image_size);
    let mut history = Vec::with_capacity(config.epochs - start_epoch + 1);

    println!(
        "{}",
        format!(
            "Training {} for epochs {}..={} ({} train / {} val samples)",
            config.arch.slug(),
            start_epoch,
            config.epochs,
            train.len(),
            val.len()
        )
        .cyan()
        .bold()
    );

    for epoch in start_epoch..=config.epochs {
        // Reseeded per epoch so a resumed run replays the same batch order
        let mut rng = ChaCha8Rng::seed_from_u64(config.seed.wrapping_add(epoch as u64));
        let mut indices: Vec<usize> = (0..train.len()).collect();
        indices.shuffle(&mut rng);

        let train_batches = indices.chunks(config.batch_size).map(|chunk| {
            let items: Vec<SegItem> = chunk.iter().map(|&i| train.items()[i].clone()).collect();
            batcher.batch::<B>(&items, &device)
        });
        let stats = trainer.train_one_epoch(epoch, train_batches)?;

        let val_batches = val
            .items()
            .chunks(config.batch_size)
            .map(|chunk| batcher.batch::<B::InnerBackend>(chunk, &inner_device));
        let report = trainer.evaluate(epoch, val_batches)?;

        let is_best = tracker.observe(epoch, report.mean_iou, report.dice);

        checkpoints.save_latest(trainer.model())?;
        if is_best {
            let snapshot = TrainingSnapshot {
                epoch,
                schedule_step: trainer.schedule().step,
                best_score: tracker.best_score(),
                best_epoch: tracker.best_epoch(),
                best_dice: tracker.best_dice(),
                scaler: trainer.scaler().cloned(),
                config: config.clone(),
            };
            checkpoints.save_best(trainer.model(), trainer.optimizer(), &snapshot)?;
        }

        log.epoch(epoch, &stats, &report, is_best)?;
        print_epoch(epoch, config.epochs, &stats, &report, is_best);
        history.push(EpochRecord {
            epoch,
            train_loss: stats.avg_loss,
            val_loss: report.loss,
            mean_iou: report.mean_iou,
            dice: report.dice,
            lr: stats.final_lr,
            is_best,
        });
    }

    let elapsed = Local::now().signed_duration_since(started);
    println!(
        "{}",
        format!(
            "Done in {}m{}s: best mIoU {:.4} (dice {:.4}) at epoch {}",
            elapsed.num_minutes(),
            elapsed.num_seconds() % 60,
            tracker.best_score(),
            tracker.best_dice(),
            tracker.best_epoch()
        )
        .green()
        .bold()
    );
    log.finish(&tracker, elapsed.num_seconds())?;

    Ok(RunSummary {
        epochs_run: config.epochs - start_epoch + 1,
        best_epoch: tracker.best_epoch(),
        best_score: tracker.best_score(),
        best_dice: tracker.best_dice(),
        history,
        log_path: log.path,
    })
}

/// Evaluate the best checkpoint on a named split without training.
pub fn run_evaluation<B: AutodiffBackend>(
    config: &TrainingConfig,
    data_root: &Path,
    split: &str,
) -> Result<EvalReport> {
    config.validate()?;

    let device = B::Device::default();
    let inner_device = <B::InnerBackend as Backend>::Device::default();

    let dataset = SegDataset::load(data_root, split, config.image_size)?;
    let model_config = config.arch.model_config(config.total_classes(), 3);
    let model = SegModel::<B>::new(&model_config, &device);
    let optimizer = AdamConfig::new().init();

    let checkpoints = CheckpointManager::new(&config.checkpoint_dir, config.arch)?;
    let (model, optimizer, _snapshot) = checkpoints.load_best(model, optimizer, &device)?;

    let schedule = PolyWarmupSchedule::new(config.learning_rate, 1, 1, 0);
    let trainer = Trainer::new(model, optimizer, schedule, None, config.class_weights.clone());

    let batcher = SegBatcher::new(config.image_size);
    let batches = dataset
        .items()
        .chunks(config.batch_size)
        .map(|chunk| batcher.batch::<B::InnerBackend>(chunk, &inner_device));

    trainer.evaluate(0, batches)
}

fn print_epoch(
    epoch: usize,
    epochs: usize,
    stats: &TrainEpochStats,
    report: &EvalReport,
    is_best: bool,
) {
    let line = format!(
        "Epoch {:>3}/{}: train {:.4} | val {:.4} | mIoU {:.4} | dice {:.4} | lr {:.3e}",
        epoch, epochs, stats.avg_loss, report.loss, report.mean_iou, report.dice, stats.final_lr
    );
    if is_best {
        println!("{} {}", line, "*best*".green().bold());
    } else {
        println!("{}", line);
    }
}

/// Append-only per-run log file
struct RunLog {
    file: std::fs::File,
    path: PathBuf,
}

impl RunLog {
    fn create(log_dir: &str, slug: &str, config: &TrainingConfig) -> Result<Self> {
        std::fs::create_dir_all(log_dir)?;
        let stamp = Local::now().format("%Y%m%d_%H%M%S");
        let path = Path::new(log_dir).join(format!("{}_{}.txt", slug, stamp));
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)?;

        let header = serde_json::to_string(config)
            .map_err(|e| TrainError::Serialization(e.to_string()))?;
        writeln!(file, "config: {}", header)?;
        Ok(Self { file, path })
    }

    fn epoch(
        &mut self,
        epoch: usize,
        stats: &TrainEpochStats,
        report: &EvalReport,
        is_best: bool,
    ) -> Result<()> {
        writeln!(self.file, "[epoch: {}]", epoch)?;
        writeln!(
            self.file,
            "train loss: {:.6} | lr: {:.6e} | batches: {} | skipped: {}",
            stats.avg_loss, stats.final_lr, stats.batches, stats.skipped
        )?;
        writeln!(
            self.file,
            "val loss: {:.6} | mIoU: {:.6} | dice: {:.6}{}",
            report.loss,
            report.mean_iou,
            report.dice,
            if is_best { " | new best" } else { "" }
        )?;
        writeln!(self.file, "{}", report.confusion.report())?;
        Ok(())
    }

    fn finish(&mut self, tracker: &BestTracker, elapsed_secs: i64) -> Result<()> {
        writeln!(
            self.file,
            "finished in {}s: best mIoU {:.6} (dice {:.6}) at epoch {}",
            elapsed_secs,
            tracker.best_score(),
            tracker.best_dice(),
            tracker.best_epoch()
        )?;
        Ok(())
    }
}
