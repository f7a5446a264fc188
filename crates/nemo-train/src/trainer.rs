//! Training loop, evaluation and model persistence

use crate::batcher::{PatchBatch, PatchBatcher};
use crate::config::TrainingConfig;
use crate::dataset::{Datasets, SplitDataset, StreamOptions};
use crate::model::{categorical_cross_entropy, correct_predictions, ClassifierConfig, TransferClassifier};
use crate::Result;
use anyhow::Context;
use burn::{
    config::Config,
    data::dataloader::batcher::Batcher,
    module::{AutodiffModule, Module},
    optim::{GradientsParams, Optimizer, RmsPropConfig},
    record::{FullPrecisionSettings, NamedMpkFileRecorder},
    tensor::{backend::{AutodiffBackend, Backend}, ElementConversion},
};
use chrono::{DateTime, Utc};
use nemo_core::{LabelVocabulary, NemoError};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Loss and accuracy over a whole split
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Evaluation {
    pub loss: f64,
    pub accuracy: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EpochStats {
    pub epoch: usize,
    pub loss: f64,
    pub accuracy: f64,
    pub valid: Evaluation,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrainingReport {
    /// Training split, before any update
    pub initial: Evaluation,
    pub history: Vec<EpochStats>,
    /// Test split, after training
    pub test: Evaluation,
    pub artifacts: ArtifactPaths,
}

/// Files that make up a persisted model
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactPaths {
    /// Weights, burn named MessagePack record
    pub model: PathBuf,
    /// Label vocabulary
    pub labels: PathBuf,
    /// Classifier topology
    pub config: PathBuf,
}

impl ArtifactPaths {
    pub fn new(dir: &Path, stem: &str) -> Self {
        Self {
            model: dir.join(format!("{}.mpk", stem)),
            labels: dir.join(format!("{}-labels.json", stem)),
            config: dir.join(format!("{}-config.json", stem)),
        }
    }

    /// Sibling files of a model weights file
    pub fn from_model_path(path: &Path) -> Self {
        let dir = path.parent().unwrap_or_else(|| Path::new(""));
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let stem = name.strip_suffix(".mpk").unwrap_or(&name);
        Self::new(dir, stem)
    }
}

/// `nemo--<UTC %Y-%m-%d-%H%M>--<accuracy, 2 decimals>`
pub fn model_stem(timestamp: DateTime<Utc>, accuracy: f64) -> String {
    format!("nemo--{}--{:.2}", timestamp.format("%Y-%m-%d-%H%M"), accuracy)
}

/// Classifier for `num_classes` classes, with pretrained backbone weights
/// when `backbone` is given.
pub fn build_classifier<B: Backend>(
    config: &TrainingConfig,
    num_classes: usize,
    backbone: Option<&Path>,
    device: &B::Device,
) -> Result<(ClassifierConfig, TransferClassifier<B>)> {
    let classifier = ClassifierConfig::new(num_classes)
        .with_hidden_units(config.hidden_units)
        .with_backbone_width(config.backbone_width);

    let features = classifier.backbone().init::<B>(device);
    let features = match backbone {
        Some(path) => {
            info!("Loading backbone weights from {:?}", path);
            features.load_pretrained(path, device)?
        }
        None => {
            warn!("No backbone weights given; features are randomly initialised");
            features
        }
    };

    let model = classifier.init_with(features, device);
    Ok((classifier, model))
}

/// Mean loss and accuracy of `model` over one pass of `split`
pub fn evaluate<B: Backend>(
    model: &TransferClassifier<B>,
    split: &SplitDataset,
    options: &StreamOptions,
    num_classes: usize,
    seed: u64,
) -> Result<Evaluation> {
    let device = model.devices().into_iter().next().unwrap_or_default();
    let batcher = PatchBatcher::new(options.image_size, num_classes);

    let mut loss_sum = 0.0;
    let mut correct = 0;
    let mut seen = 0;

    for samples in split.stream(options, seed) {
        let samples = samples.with_context(|| format!("Failed to read split {:?}", split.dir()))?;
        let batch: PatchBatch<B> = batcher.batch(samples, &device);
        let size = batch.len();

        let logits = model.forward(batch.images);
        let loss: f64 = categorical_cross_entropy(logits.clone(), batch.targets)
            .into_scalar()
            .elem();

        loss_sum += loss * size as f64;
        correct += correct_predictions(logits, batch.labels);
        seen += size;
    }

    if seen == 0 {
        return Err(NemoError::EmptySplit {
            path: split.dir().to_path_buf(),
        }
        .into());
    }

    Ok(Evaluation {
        loss: loss_sum / seen as f64,
        accuracy: correct as f64 / seen as f64,
    })
}

/// Fits the classifier head and persists the result
pub struct Trainer<B: AutodiffBackend> {
    config: TrainingConfig,
    device: B::Device,
}

impl<B: AutodiffBackend> Trainer<B> {
    pub fn new(config: TrainingConfig, device: B::Device) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, device })
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// Baseline evaluation, `epochs` epochs of RMSprop over the repeated
    /// training stream with validation after each, final test evaluation,
    /// then save weights, labels and topology into `output_dir`.
    pub fn train(
        &self,
        datasets: &Datasets,
        classifier: &ClassifierConfig,
        model: TransferClassifier<B>,
        output_dir: &Path,
    ) -> Result<TrainingReport> {
        let config = &self.config;
        let metadata = &datasets.metadata;
        let num_classes = metadata.labels.len();

        let steps = metadata.steps_per_epoch(config);
        if steps == 0 {
            return Err(NemoError::Config(format!(
                "training split has {} images, fewer than one batch of {}",
                metadata.train_count, config.batch_size
            ))
            .into());
        }

        let eval_options = StreamOptions::evaluation(config);

        info!("Evaluating model before training...");
        let initial = evaluate(
            &model.valid(),
            &datasets.train,
            &eval_options,
            num_classes,
            config.seed,
        )?;
        info!("initial loss: {:.2}", initial.loss);
        info!("initial accuracy: {:.2}", initial.accuracy);

        info!(
            "Training for {} epochs of {} steps (batch size {})",
            config.epochs, steps, config.batch_size
        );

        let mut model = model;
        let mut optimizer = RmsPropConfig::new()
            .with_alpha(config.rms_rho)
            .with_epsilon(config.rms_epsilon)
            .init();
        let batcher = PatchBatcher::new(config.image_size, num_classes);
        let mut stream = datasets
            .train
            .repeat(&StreamOptions::training(config), config.seed);

        let mut history = Vec::with_capacity(config.epochs);
        for epoch in 1..=config.epochs {
            let mut loss_sum = 0.0;
            let mut correct = 0;
            let mut seen = 0;

            for step in 0..steps {
                let samples = stream
                    .next()
                    .ok_or_else(|| NemoError::EmptySplit {
                        path: datasets.train.dir().to_path_buf(),
                    })?
                    .context("Failed to read training batch")?;
                let batch: PatchBatch<B> = batcher.batch(samples, &self.device);
                let size = batch.len();

                let logits = model.forward(batch.images);
                let loss = categorical_cross_entropy(logits.clone(), batch.targets);
                let loss_value: f64 = loss.clone().into_scalar().elem();

                loss_sum += loss_value * size as f64;
                correct += correct_predictions(logits, batch.labels);
                seen += size;

                let grads = GradientsParams::from_grads(loss.backward(), &model);
                model = optimizer.step(config.learning_rate, model, grads);

                debug!("epoch {} step {}/{}: loss {:.4}", epoch, step + 1, steps, loss_value);
            }

            let valid = evaluate(
                &model.valid(),
                &datasets.valid,
                &eval_options,
                num_classes,
                config.seed.wrapping_add(epoch as u64),
            )?;
            let stats = EpochStats {
                epoch,
                loss: loss_sum / seen as f64,
                accuracy: correct as f64 / seen as f64,
                valid,
            };
            info!(
                "Epoch {}/{}: loss {:.4}, accuracy {:.4}, val_loss {:.4}, val_accuracy {:.4}",
                epoch, config.epochs, stats.loss, stats.accuracy, valid.loss, valid.accuracy
            );
            history.push(stats);
        }

        info!("Evaluating model after training...");
        let test = evaluate(
            &model.valid(),
            &datasets.test,
            &eval_options,
            num_classes,
            config.seed,
        )?;
        info!("final loss: {:.2}", test.loss);
        info!("final accuracy: {:.2}", test.accuracy);

        let artifacts = save_model(
            model,
            classifier,
            &metadata.labels,
            output_dir,
            &model_stem(Utc::now(), test.accuracy),
        )?;

        Ok(TrainingReport {
            initial,
            history,
            test,
            artifacts,
        })
    }
}

/// Write weights, labels and topology under `output_dir` as `<stem>*`
pub fn save_model<B: Backend>(
    model: TransferClassifier<B>,
    classifier: &ClassifierConfig,
    labels: &LabelVocabulary,
    output_dir: &Path,
    stem: &str,
) -> Result<ArtifactPaths> {
    fs::create_dir_all(output_dir).map_err(|e| NemoError::io(output_dir, e))?;
    let paths = ArtifactPaths::new(output_dir, stem);

    model
        .save_file(
            paths.model.clone(),
            &NamedMpkFileRecorder::<FullPrecisionSettings>::new(),
        )
        .map_err(|e| NemoError::Model(format!("failed to save {:?}: {:?}", paths.model, e)))?;
    labels.save(&paths.labels)?;
    classifier
        .save(&paths.config)
        .map_err(|e| NemoError::io(&paths.config, e))?;

    info!("Saved model to {:?}", paths.model);
    Ok(paths)
}
