//! Epoch Trainer
//!
//! One training pass and one evaluation pass over finite batch streams. The
//! trainer owns the joint training state (model, optimizer, schedule, scaler)
//! explicitly; the run orchestrator hands it batches and reads the results.
//!
//! The learning rate is sampled from the schedule before every optimizer step
//! and the schedule advances once per batch, including batches skipped by the
//! loss scaler, so the step counter always equals the number of batches seen.

use burn::module::AutodiffModule;
use burn::optim::{GradientsParams, Optimizer};
use burn::tensor::backend::AutodiffBackend;
use burn::tensor::ElementConversion;
use tracing::{debug, warn};

use crate::dataset::SegBatch;
use crate::model::SegModel;
use crate::training::amp::LossScaler;
use crate::training::loss::segmentation_cross_entropy;
use crate::training::scheduler::PolyWarmupSchedule;
use crate::utils::error::{Result, TrainError};
use crate::utils::metrics::ConfusionMatrix;

/// Aggregated results of one training pass
#[derive(Debug, Clone)]
pub struct TrainEpochStats {
    /// Mean loss over non-skipped batches
    pub avg_loss: f64,
    /// Learning rate used for the last batch of the epoch
    pub final_lr: f64,
    /// Batches consumed
    pub batches: usize,
    /// Optimizer steps skipped by the loss scaler
    pub skipped: usize,
}

/// Aggregated results of one evaluation pass
#[derive(Debug, Clone)]
pub struct EvalReport {
    /// Pixel-level confusion matrix over the whole stream
    pub confusion: ConfusionMatrix,
    /// Mean validation loss
    pub loss: f64,
    /// Mean IoU over all classes, background included
    pub mean_iou: f64,
    /// Mean Dice over all classes, background included
    pub dice: f64,
}

/// Tracks the best validation score seen so far.
///
/// Comparison is non-strict, so a later epoch that ties the best score
/// replaces it. Starts below any real score, so the first completed epoch
/// always becomes the initial best.
#[derive(Debug, Clone)]
pub struct BestTracker {
    best_score: f64,
    best_epoch: usize,
    best_dice: f64,
}

impl Default for BestTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl BestTracker {
    pub fn new() -> Self {
        Self {
            best_score: f64::NEG_INFINITY,
            best_epoch: 0,
            best_dice: 0.0,
        }
    }

    /// Rebuild the tracker from a restored snapshot
    pub fn restore(best_score: f64, best_epoch: usize, best_dice: f64) -> Self {
        Self {
            best_score,
            best_epoch,
            best_dice,
        }
    }

    /// Observe one epoch's validation score; returns true when it becomes the
    /// new best.
    pub fn observe(&mut self, epoch: usize, score: f64, dice: f64) -> bool {
        if score >= self.best_score {
            self.best_score = score;
            self.best_epoch = epoch;
            self.best_dice = dice;
            true
        } else {
            false
        }
    }

    pub fn best_score(&self) -> f64 {
        self.best_score
    }

    pub fn best_epoch(&self) -> usize {
        self.best_epoch
    }

    pub fn best_dice(&self) -> f64 {
        self.best_dice
    }
}

/// Owns the mutable training state and runs single passes over batch streams.
pub struct Trainer<B, O>
where
    B: AutodiffBackend,
    O: Optimizer<SegModel<B>, B>,
{
    model: SegModel<B>,
    optimizer: O,
    schedule: PolyWarmupSchedule,
    scaler: Option<LossScaler>,
    class_weights: Option<Vec<f32>>,
}

impl<B, O> Trainer<B, O>
where
    B: AutodiffBackend,
    O: Optimizer<SegModel<B>, B>,
{
    pub fn new(
        model: SegModel<B>,
        optimizer: O,
        schedule: PolyWarmupSchedule,
        scaler: Option<LossScaler>,
        class_weights: Option<Vec<f32>>,
    ) -> Self {
        Self {
            model,
            optimizer,
            schedule,
            scaler,
            class_weights,
        }
    }

    pub fn model(&self) -> &SegModel<B> {
        &self.model
    }

    pub fn optimizer(&self) -> &O {
        &self.optimizer
    }

    pub fn schedule(&self) -> &PolyWarmupSchedule {
        &self.schedule
    }

    pub fn scaler(&self) -> Option<&LossScaler> {
        self.scaler.as_ref()
    }

    /// Replace the model, e.g. after loading a checkpoint slot
    pub fn set_model(&mut self, model: SegModel<B>) {
        self.model = model;
    }

    /// One full training pass over `batches`.
    ///
    /// An empty stream is an error: the epoch counter must never advance
    /// without the model having seen data.
    pub fn train_one_epoch(
        &mut self,
        epoch: usize,
        batches: impl Iterator<Item = SegBatch<B>>,
    ) -> Result<TrainEpochStats> {
        let mut model = self.model.clone();
        let mut epoch_loss = 0.0;
        let mut batch_count = 0usize;
        let mut skipped = 0usize;
        let mut final_lr = self.schedule.lr();

        for (batch_index, batch) in batches.enumerate() {
            let lr = self.schedule.lr();
            final_lr = lr;

            let output = model.forward(batch.images);
            let loss =
                segmentation_cross_entropy(output, batch.targets, self.class_weights.as_deref());
            let loss_value: f64 = loss.clone().into_scalar().elem();

            if !loss_value.is_finite() {
                self.model = model;
                return Err(TrainError::NumericInstability {
                    epoch,
                    batch: batch_index,
                });
            }

            let loss = match &mut self.scaler {
                Some(scaler) => {
                    let scaled_value = loss_value * scaler.scale();
                    if !scaled_value.is_finite() {
                        // Overflow in the scaled domain: back off and skip
                        // this optimizer step, but keep the schedule moving.
                        scaler.update_on_overflow();
                        skipped += 1;
                        warn!(
                            "Skipped batch {} of epoch {} (scaled loss overflow, scale now {})",
                            batch_index,
                            epoch,
                            scaler.scale()
                        );
                        self.schedule.advance();
                        continue;
                    }
                    loss * scaler.scale()
                }
                None => loss,
            };

            let grads = GradientsParams::from_grads(loss.backward(), &model);
            model = self.optimizer.step(lr, model, grads);
            self.schedule.advance();

            if let Some(scaler) = &mut self.scaler {
                scaler.update_on_success();
            }

            epoch_loss += loss_value;
            batch_count += 1;
            debug!(
                "epoch {} batch {}: loss {:.4}, lr {:.6e}",
                epoch, batch_index, loss_value, lr
            );
        }

        self.model = model;

        if batch_count + skipped == 0 {
            return Err(TrainError::DataExhaustion(epoch));
        }

        let avg_loss = if batch_count > 0 {
            epoch_loss / batch_count as f64
        } else {
            0.0
        };

        Ok(TrainEpochStats {
            avg_loss,
            final_lr,
            batches: batch_count + skipped,
            skipped,
        })
    }

    /// One evaluation pass over `batches`, with gradients disabled.
    ///
    /// Aggregates a single confusion matrix over the whole stream; per-class
    /// scores are derived from it after all batches are consumed.
    pub fn evaluate(
        &self,
        epoch: usize,
        batches: impl Iterator<Item = SegBatch<B::InnerBackend>>,
    ) -> Result<EvalReport> {
        let model = self.model.valid();
        let mut confusion = ConfusionMatrix::new(model.num_classes());
        let mut total_loss = 0.0;
        let mut batch_count = 0usize;

        for batch in batches {
            let output = model.forward(batch.images);
            let loss = segmentation_cross_entropy(
                output.clone(),
                batch.targets.clone(),
                self.class_weights.as_deref(),
            );
            let loss_value: f64 = loss.into_scalar().elem();
            total_loss += loss_value;
            batch_count += 1;

            let predictions = output.argmax(1).squeeze::<3>(1);
            let predicted: Vec<i64> = predictions
                .into_data()
                .to_vec()
                .map_err(|e| TrainError::Model(format!("failed to read predictions: {:?}", e)))?;
            let truth: Vec<i64> = batch
                .targets
                .into_data()
                .to_vec()
                .map_err(|e| TrainError::Model(format!("failed to read targets: {:?}", e)))?;

            confusion.update(&predicted, &truth);
        }

        if batch_count == 0 {
            return Err(TrainError::DataExhaustion(epoch));
        }

        let mean_iou = confusion.mean_iou();
        let dice = confusion.dice();

        Ok(EvalReport {
            confusion,
            loss: total_loss / batch_count as f64,
            mean_iou,
            dice,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{SegBatcher, SegItem};
    use crate::model::SegModelConfig;
    use burn::backend::Autodiff;
    use burn::optim::AdamConfig;

    type TestBackend = Autodiff<burn::backend::NdArray<f32>>;
    type InnerBackend = burn::backend::NdArray<f32>;

    fn item(size: usize, label: i64) -> SegItem {
        SegItem {
            image: vec![if label == 0 { 0.1 } else { 0.9 }; 3 * size * size],
            mask: vec![label; size * size],
            size,
        }
    }

    fn trainer(
        num_classes: usize,
        scaler: Option<LossScaler>,
    ) -> Trainer<TestBackend, impl Optimizer<SegModel<TestBackend>, TestBackend>> {
        let device = Default::default();
        let config = SegModelConfig::new(num_classes).with_base_filters(4);
        let model = SegModel::<TestBackend>::new(&config, &device);
        let optimizer = AdamConfig::new().init();
        let schedule = PolyWarmupSchedule::new(1e-3, 4, 3, 0);
        Trainer::new(model, optimizer, schedule, scaler, None)
    }

    #[test]
    fn test_train_epoch_advances_schedule_per_batch() {
        let device = Default::default();
        let batcher = SegBatcher::new(8);
        let mut trainer = trainer(2, None);

        let items = vec![item(8, 0), item(8, 1)];
        let batches = (0..3).map(|_| batcher.batch::<TestBackend>(&items, &device));

        let stats = trainer.train_one_epoch(1, batches).unwrap();
        assert_eq!(stats.batches, 3);
        assert_eq!(stats.skipped, 0);
        assert_eq!(trainer.schedule().step, 3);
        assert!(stats.avg_loss.is_finite());
    }

    #[test]
    fn test_empty_stream_is_data_exhaustion() {
        let mut trainer = trainer(2, None);
        let result = trainer.train_one_epoch(4, std::iter::empty());
        assert!(matches!(result, Err(TrainError::DataExhaustion(4))));
    }

    #[test]
    fn test_nan_input_surfaces_numeric_instability() {
        let device = Default::default();
        let batcher = SegBatcher::new(8);
        let mut trainer = trainer(2, None);

        let poisoned = SegItem {
            image: vec![f32::NAN; 3 * 8 * 8],
            mask: vec![0; 8 * 8],
            size: 8,
        };
        let batches = std::iter::once(batcher.batch::<TestBackend>(&[poisoned], &device));

        let result = trainer.train_one_epoch(2, batches);
        assert!(matches!(
            result,
            Err(TrainError::NumericInstability { epoch: 2, batch: 0 })
        ));
    }

    #[test]
    fn test_scaler_overflow_skips_but_schedule_advances() {
        let device = Default::default();
        let batcher = SegBatcher::new(8);
        // Scale chosen so any finite loss overflows f64 when multiplied
        let mut trainer = trainer(2, Some(LossScaler::with_scale(f64::MAX)));

        let items = vec![item(8, 0)];
        let batches = (0..2).map(|_| batcher.batch::<TestBackend>(&items, &device));

        let stats = trainer.train_one_epoch(1, batches).unwrap();
        assert!(stats.skipped >= 1);
        assert_eq!(trainer.schedule().step, 2);
    }

    #[test]
    fn test_evaluate_aggregates_confusion_over_stream() {
        let device = Default::default();
        let batcher = SegBatcher::new(8);
        let trainer = trainer(3, None);

        let items_a = vec![item(8, 0)];
        let items_b = vec![item(8, 1)];
        let batches = vec![
            batcher.batch::<InnerBackend>(&items_a, &device),
            batcher.batch::<InnerBackend>(&items_b, &device),
        ];

        let report = trainer.evaluate(1, batches.into_iter()).unwrap();
        assert_eq!(report.confusion.total(), 2 * 8 * 8);
        assert!(report.loss.is_finite());
        assert!((0.0..=1.0).contains(&report.mean_iou));
        assert!((0.0..=1.0).contains(&report.dice));
    }

    #[test]
    fn test_evaluate_empty_stream_is_data_exhaustion() {
        let trainer = trainer(2, None);
        let result = trainer.evaluate(7, std::iter::empty());
        assert!(matches!(result, Err(TrainError::DataExhaustion(7))));
    }

    #[test]
    fn test_best_tracker_non_strict_tie_break() {
        let mut tracker = BestTracker::new();
        let scores = [0.10, 0.20, 0.20, 0.15];

        for (i, &score) in scores.iter().enumerate() {
            tracker.observe(i + 1, score, score);
        }

        // The later of the two tied epochs wins
        assert_eq!(tracker.best_epoch(), 3);
        assert_eq!(tracker.best_score(), 0.20);
    }

    #[test]
    fn test_best_tracker_first_epoch_always_wins() {
        let mut tracker = BestTracker::new();
        assert!(tracker.observe(1, -5.0, 0.0));
        assert_eq!(tracker.best_epoch(), 1);
    }
}
