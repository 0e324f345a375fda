//! Metrics Module for Segmentation Evaluation
//!
//! Provides confusion-matrix-based metrics for pixel classification:
//! - Per-class and mean intersection-over-union (IoU)
//! - Dice score
//! - Global and per-class pixel accuracy
//!
//! Dice is macro-averaged over the configured class count (background
//! included), with the same averaging convention as mean IoU. Classes absent
//! from both prediction and ground truth contribute 0 to either average.

use serde::{Deserialize, Serialize};

use crate::IGNORE_INDEX;

/// Confusion matrix accumulated over an evaluation pass.
///
/// Rows are ground-truth classes, columns are predicted classes, stored as a
/// flat vector in row-major order. Pixels labeled with the ignore sentinel are
/// excluded; updates across batches are pure addition, so batch order never
/// affects the final matrix.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    /// Number of classes (including background)
    pub num_classes: usize,

    /// Matrix data (row = actual, column = predicted)
    pub matrix: Vec<u64>,
}

impl Default for ConfusionMatrix {
    fn default() -> Self {
        Self::new(0)
    }
}

impl ConfusionMatrix {
    /// Create a new empty confusion matrix
    pub fn new(num_classes: usize) -> Self {
        Self {
            num_classes,
            matrix: vec![0; num_classes * num_classes],
        }
    }

    /// Accumulate one batch of per-pixel predictions against ground truth.
    ///
    /// Both slices hold one class index per pixel and must have equal length;
    /// spatial shape is irrelevant, so short final batches work unchanged.
    pub fn update(&mut self, predicted: &[i64], truth: &[i64]) {
        debug_assert_eq!(predicted.len(), truth.len());

        for (&pred, &actual) in predicted.iter().zip(truth.iter()) {
            if actual == IGNORE_INDEX {
                continue;
            }
            if actual >= 0
                && (actual as usize) < self.num_classes
                && pred >= 0
                && (pred as usize) < self.num_classes
            {
                self.matrix[actual as usize * self.num_classes + pred as usize] += 1;
            }
        }
    }

    /// Get the count at (actual, predicted)
    pub fn get(&self, actual: usize, predicted: usize) -> u64 {
        if actual < self.num_classes && predicted < self.num_classes {
            self.matrix[actual * self.num_classes + predicted]
        } else {
            0
        }
    }

    /// Total number of counted pixels
    pub fn total(&self) -> u64 {
        self.matrix.iter().sum()
    }

    /// Diagonal sum (correctly classified pixels)
    pub fn correct(&self) -> u64 {
        (0..self.num_classes).map(|i| self.get(i, i)).sum()
    }

    /// Global pixel accuracy
    pub fn global_accuracy(&self) -> f64 {
        let total = self.total();
        if total > 0 {
            self.correct() as f64 / total as f64
        } else {
            0.0
        }
    }

    /// Row sums (ground-truth pixel counts per class)
    pub fn row_sums(&self) -> Vec<u64> {
        (0..self.num_classes)
            .map(|row| (0..self.num_classes).map(|col| self.get(row, col)).sum())
            .collect()
    }

    /// Column sums (predicted pixel counts per class)
    pub fn col_sums(&self) -> Vec<u64> {
        (0..self.num_classes)
            .map(|col| (0..self.num_classes).map(|row| self.get(row, col)).sum())
            .collect()
    }

    /// Per-class pixel accuracy (recall), 0 for classes with no truth pixels
    pub fn per_class_accuracy(&self) -> Vec<f64> {
        let rows = self.row_sums();
        (0..self.num_classes)
            .map(|c| {
                if rows[c] > 0 {
                    self.get(c, c) as f64 / rows[c] as f64
                } else {
                    0.0
                }
            })
            .collect()
    }

    /// Per-class IoU: diag / (row + col - diag), 0 when the denominator is 0
    pub fn per_class_iou(&self) -> Vec<f64> {
        let rows = self.row_sums();
        let cols = self.col_sums();
        (0..self.num_classes)
            .map(|c| {
                let tp = self.get(c, c);
                let denom = rows[c] + cols[c] - tp;
                if denom > 0 {
                    tp as f64 / denom as f64
                } else {
                    0.0
                }
            })
            .collect()
    }

    /// Mean IoU over all configured classes, background included
    pub fn mean_iou(&self) -> f64 {
        if self.num_classes == 0 {
            return 0.0;
        }
        self.per_class_iou().iter().sum::<f64>() / self.num_classes as f64
    }

    /// Per-class Dice: 2*diag / (row + col), 0 when the denominator is 0
    pub fn per_class_dice(&self) -> Vec<f64> {
        let rows = self.row_sums();
        let cols = self.col_sums();
        (0..self.num_classes)
            .map(|c| {
                let tp = self.get(c, c);
                let denom = rows[c] + cols[c];
                if denom > 0 {
                    2.0 * tp as f64 / denom as f64
                } else {
                    0.0
                }
            })
            .collect()
    }

    /// Dice score macro-averaged over all configured classes
    pub fn dice(&self) -> f64 {
        if self.num_classes == 0 {
            return 0.0;
        }
        self.per_class_dice().iter().sum::<f64>() / self.num_classes as f64
    }

    /// Human-readable report for the run log
    pub fn report(&self) -> String {
        let mut output = String::new();

        output.push_str(&format!(
            "global accuracy: {:.2}\n",
            self.global_accuracy() * 100.0
        ));
        output.push_str(&format!(
            "class accuracy: {}\n",
            format_percent_list(&self.per_class_accuracy())
        ));
        output.push_str(&format!(
            "class IoU: {}\n",
            format_percent_list(&self.per_class_iou())
        ));
        output.push_str(&format!("mean IoU: {:.2}", self.mean_iou() * 100.0));

        output
    }
}

fn format_percent_list(values: &[f64]) -> String {
    let parts: Vec<String> = values.iter().map(|v| format!("{:.2}", v * 100.0)).collect();
    format!("[{}]", parts.join(", "))
}

impl std::fmt::Display for ConfusionMatrix {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.report())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absent_class_iou_is_zero() {
        // Class 2 never appears in truth or prediction
        let mut cm = ConfusionMatrix::new(3);
        cm.update(&[0, 1, 0, 1], &[0, 1, 1, 1]);

        let iou = cm.per_class_iou();
        assert_eq!(iou[2], 0.0);
        assert!(iou.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_mean_iou_in_unit_interval() {
        let mut cm = ConfusionMatrix::new(4);
        cm.update(&[0, 1, 2, 3, 0, 1], &[0, 2, 2, 3, 1, 1]);

        let miou = cm.mean_iou();
        assert!(miou >= 0.0 && miou <= 1.0);

        // mean IoU is the documented macro average
        let expected = cm.per_class_iou().iter().sum::<f64>() / 4.0;
        assert!((miou - expected).abs() < 1e-12);
    }

    #[test]
    fn test_ignore_pixels_excluded() {
        let mut cm = ConfusionMatrix::new(2);
        cm.update(&[0, 1, 0], &[0, 1, IGNORE_INDEX]);

        assert_eq!(cm.total(), 2);
        assert_eq!(cm.get(0, 0), 1);
        assert_eq!(cm.get(1, 1), 1);
    }

    #[test]
    fn test_batch_order_independence() {
        let b1_pred = vec![0i64, 1, 1, 0];
        let b1_truth = vec![0i64, 1, 0, 0];
        let b2_pred = vec![1i64, 1, 0];
        let b2_truth = vec![1i64, 0, 0];

        let mut forward = ConfusionMatrix::new(2);
        forward.update(&b1_pred, &b1_truth);
        forward.update(&b2_pred, &b2_truth);

        let mut reverse = ConfusionMatrix::new(2);
        reverse.update(&b2_pred, &b2_truth);
        reverse.update(&b1_pred, &b1_truth);

        assert_eq!(forward.matrix, reverse.matrix);
    }

    #[test]
    fn test_perfect_prediction_4x4() {
        // 2-class 4x4 batch, every pixel correct
        let truth: Vec<i64> = (0..16).map(|i| if i < 8 { 0 } else { 1 }).collect();
        let pred = truth.clone();

        let mut cm = ConfusionMatrix::new(2);
        cm.update(&pred, &truth);

        assert!((cm.mean_iou() - 1.0).abs() < 1e-12);
        assert!((cm.dice() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_all_background_prediction() {
        // Truth is half foreground / half background, prediction all background
        let truth: Vec<i64> = (0..16).map(|i| if i < 8 { 0 } else { 1 }).collect();
        let pred = vec![0i64; 16];

        let mut cm = ConfusionMatrix::new(2);
        cm.update(&pred, &truth);

        let iou = cm.per_class_iou();
        assert!((iou[0] - 0.5).abs() < 1e-12); // background
        assert_eq!(iou[1], 0.0); // foreground
        assert!((cm.mean_iou() - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_empty_matrix_metrics_defined() {
        let cm = ConfusionMatrix::new(3);
        assert_eq!(cm.total(), 0);
        assert_eq!(cm.mean_iou(), 0.0);
        assert_eq!(cm.dice(), 0.0);
        assert_eq!(cm.global_accuracy(), 0.0);
    }

    #[test]
    fn test_report_contains_mean_iou() {
        let mut cm = ConfusionMatrix::new(2);
        cm.update(&[0, 1], &[0, 1]);
        let report = cm.report();
        assert!(report.contains("mean IoU"));
        assert!(report.contains("global accuracy"));
    }
}
