//! Nemo training library
//!
//! Fine-tunes a classifier head on top of a frozen VGG16 backbone using
//! the patches written by the preprocessing stage, and classifies new
//! patches with the saved result.

pub mod batcher;
pub mod config;
pub mod dataset;
pub mod images;
pub mod model;
pub mod predictor;
pub mod trainer;

pub use batcher::{PatchBatch, PatchBatcher};
pub use config::{AugmentConfig, TrainingConfig};
pub use dataset::{load_datasets, DatasetMetadata, Datasets, Sample, SplitDataset, StreamOptions};
pub use model::{ClassifierConfig, TransferClassifier, Vgg16Config, Vgg16Features};
pub use predictor::{Prediction, Predictor};
pub use trainer::{
    build_classifier, evaluate, model_stem, ArtifactPaths, EpochStats, Evaluation, Trainer,
    TrainingReport,
};

// Error handling
pub type Result<T> = anyhow::Result<T>;
