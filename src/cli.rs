//! Command-line interface

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use nemo_cv::SegmentationConfig;
use nemo_train::TrainingConfig;
use std::path::PathBuf;

/// Segment specimens out of plate scans and train a patch classifier
#[derive(Parser, Debug)]
#[command(name = "nemo", version, about, long_about = None)]
pub struct Cli {
    /// More log output (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Extract specimen patches from plate scans
    Preprocess(PreprocessArgs),

    /// Train the classifier on a directory of labeled patches
    Train(TrainArgs),

    /// Classify patch images with a trained model
    Classify(ClassifyArgs),
}

#[derive(Args, Debug)]
pub struct PreprocessArgs {
    /// Directory searched recursively for plate scans
    pub source: PathBuf,

    /// Output directory, recreated on every run
    pub output: PathBuf,

    /// Threshold used for border detection [default: 70]
    #[arg(long)]
    pub border_threshold: Option<i32>,

    /// Threshold used for object detection [default: 120]
    #[arg(long)]
    pub object_threshold: Option<i32>,

    /// Margin outside the detection region, in pixels [default: 122]
    #[arg(long)]
    pub image_margin: Option<i32>,

    /// JSON segmentation config; flags above override it
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl PreprocessArgs {
    pub fn segmentation_config(&self) -> Result<SegmentationConfig> {
        let mut config = match &self.config {
            Some(path) => SegmentationConfig::from_file(path)?,
            None => SegmentationConfig::default(),
        };

        if let Some(value) = self.border_threshold {
            config.border_threshold = value;
        }
        if let Some(value) = self.object_threshold {
            config.object_threshold = value;
        }
        if let Some(value) = self.image_margin {
            config.image_margin = value;
        }

        config.validate()?;
        Ok(config)
    }
}

#[derive(Args, Debug)]
pub struct TrainArgs {
    /// Directory holding train/, valid/ and test/ splits
    pub data_dir: PathBuf,

    /// Pretrained VGG16 backbone weights (burn record)
    #[arg(long)]
    pub backbone: PathBuf,

    /// Directory the trained model is written to
    #[arg(short, long, default_value = "output")]
    pub output: PathBuf,

    /// Number of epochs [default: 100]
    #[arg(long)]
    pub epochs: Option<usize>,

    /// JSON training config; flags above override it
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl TrainArgs {
    pub fn training_config(&self) -> Result<TrainingConfig> {
        let mut config = match &self.config {
            Some(path) => TrainingConfig::from_file(path)?,
            None => TrainingConfig::default(),
        };

        if let Some(epochs) = self.epochs {
            config.epochs = epochs;
        }

        config.validate()?;
        Ok(config)
    }
}

#[derive(Args, Debug)]
pub struct ClassifyArgs {
    /// Trained model weights (`.mpk`)
    pub model: PathBuf,

    /// Images to classify
    #[arg(required = true)]
    pub images: Vec<PathBuf>,

    /// Side length images are resized to
    #[arg(long, default_value_t = 224)]
    pub image_size: usize,

    /// Images per forward pass
    #[arg(long, default_value_t = 32)]
    pub batch_size: usize,

    /// Print predictions as JSON
    #[arg(long)]
    pub json: bool,
}
