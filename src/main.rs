//! rangeseg CLI
//!
//! Entry point for training and evaluating semantic segmentation models with
//! the Burn framework.

use std::path::Path;

use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;

use rangeseg::backend::TrainingBackend;
use rangeseg::model::{ArchKind, ResumeMode, TrainingConfig};
use rangeseg::utils::logging::{init_logging, LogConfig};

/// Semantic segmentation training engine
#[derive(Parser, Debug)]
#[command(name = "rangeseg")]
#[command(version = "0.1.0")]
#[command(about = "Train and evaluate UNet segmentation models with Burn", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, default_value = "false")]
    verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Train a segmentation model
    Train {
        /// Path to the dataset directory (with train/ and val/ splits)
        #[arg(short, long, default_value = "data")]
        data_dir: String,

        /// Architecture to train
        #[arg(long, value_enum, default_value = "unet")]
        arch: ArchKind,

        /// Number of foreground classes (background is added internally)
        #[arg(long, default_value = "4")]
        num_classes: usize,

        /// Square input size in pixels
        #[arg(long, default_value = "224")]
        image_size: usize,

        /// Number of training epochs
        #[arg(short, long, default_value = "100")]
        epochs: usize,

        /// Batch size for training and validation
        #[arg(short, long, default_value = "32")]
        batch_size: usize,

        /// Base learning rate
        #[arg(short, long, default_value = "0.0001")]
        learning_rate: f64,

        /// Weight decay
        #[arg(long, default_value = "0.0001")]
        weight_decay: f64,

        /// Linear warmup epochs (0 disables warmup)
        #[arg(long, default_value = "0")]
        warmup_epochs: usize,

        /// Per-class loss weights, background first, comma separated
        #[arg(long, value_delimiter = ',')]
        class_weights: Option<Vec<f32>>,

        /// Enable mixed-precision loss scaling
        #[arg(long, default_value = "false")]
        amp: bool,

        /// Relation to previously saved checkpoints
        #[arg(long, value_enum, default_value = "fresh")]
        resume: ResumeMode,

        /// Random seed for epoch shuffling
        #[arg(long, default_value = "42")]
        seed: u64,

        /// Directory for checkpoint slots
        #[arg(long, default_value = "save_weights")]
        checkpoint_dir: String,

        /// Directory for run logs
        #[arg(long, default_value = "log")]
        log_dir: String,
    },

    /// Evaluate the best checkpoint on a dataset split
    Evaluate {
        /// Path to the dataset directory
        #[arg(short, long, default_value = "data")]
        data_dir: String,

        /// Split to evaluate (e.g. val, test)
        #[arg(short, long, default_value = "val")]
        split: String,

        /// Architecture the checkpoint was trained with
        #[arg(long, value_enum, default_value = "unet")]
        arch: ArchKind,

        /// Number of foreground classes the checkpoint was trained with
        #[arg(long, default_value = "4")]
        num_classes: usize,

        /// Square input size in pixels
        #[arg(long, default_value = "224")]
        image_size: usize,

        /// Batch size for evaluation
        #[arg(short, long, default_value = "32")]
        batch_size: usize,

        /// Directory holding the checkpoint slots
        #[arg(long, default_value = "save_weights")]
        checkpoint_dir: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_config = if cli.verbose {
        LogConfig::verbose()
    } else {
        LogConfig::default()
    };

    let _ = init_logging(&log_config);

    match cli.command {
        Commands::Train {
            data_dir,
            arch,
            num_classes,
            image_size,
            epochs,
            batch_size,
            learning_rate,
            weight_decay,
            warmup_epochs,
            class_weights,
            amp,
            resume,
            seed,
            checkpoint_dir,
            log_dir,
        } => {
            let config = TrainingConfig {
                arch,
                num_classes,
                image_size,
                epochs,
                batch_size,
                learning_rate,
                weight_decay,
                warmup_epochs,
                class_weights,
                amp,
                resume,
                seed,
                checkpoint_dir,
                log_dir,
                ..Default::default()
            };

            let summary =
                rangeseg::training::run_training::<TrainingBackend>(&config, Path::new(&data_dir))?;
            println!(
                "Run log: {}",
                summary.log_path.display().to_string().cyan()
            );
        }

        Commands::Evaluate {
            data_dir,
            split,
            arch,
            num_classes,
            image_size,
            batch_size,
            checkpoint_dir,
        } => {
            let config = TrainingConfig {
                arch,
                num_classes,
                image_size,
                batch_size,
                checkpoint_dir,
                ..Default::default()
            };

            let report = rangeseg::training::run_evaluation::<TrainingBackend>(
                &config,
                Path::new(&data_dir),
                &split,
            )?;

            println!(
                "{}",
                format!(
                    "{} split: loss {:.4} | mIoU {:.4} | dice {:.4}",
                    split, report.loss, report.mean_iou, report.dice
                )
                .green()
                .bold()
            );
            println!("{}", report.confusion.report());
        }
    }

    Ok(())
}
