//! Classification of patch images with a persisted model

use crate::batcher::{PatchBatch, PatchBatcher};
use crate::dataset::Sample;
use crate::images::load_and_preprocess;
use crate::model::{ClassifierConfig, TransferClassifier};
use crate::trainer::ArtifactPaths;
use crate::Result;
use anyhow::Context;
use burn::{
    config::Config,
    data::dataloader::batcher::Batcher,
    module::Module,
    record::{FullPrecisionSettings, NamedMpkFileRecorder},
    tensor::backend::Backend,
};
use nemo_core::{LabelVocabulary, NemoError};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Images per forward pass unless set with [`Predictor::with_batch_size`]
pub const DEFAULT_BATCH_SIZE: usize = 32;

/// Most likely class of one image
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prediction {
    pub path: PathBuf,
    pub label: String,
    pub index: usize,
    /// Softmax probability of `label`
    pub confidence: f32,
}

pub struct Predictor<B: Backend> {
    model: TransferClassifier<B>,
    labels: LabelVocabulary,
    image_size: usize,
    batch_size: usize,
    device: B::Device,
}

impl<B: Backend> Predictor<B> {
    pub fn new(
        model: TransferClassifier<B>,
        labels: LabelVocabulary,
        image_size: usize,
        device: B::Device,
    ) -> Self {
        Self {
            model,
            labels,
            image_size,
            batch_size: DEFAULT_BATCH_SIZE,
            device,
        }
    }

    /// Bound the number of images decoded and run per forward pass
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Load a model saved by the trainer, together with its label and
    /// topology files.
    pub fn load<P: AsRef<Path>>(model_path: P, image_size: usize, device: B::Device) -> Result<Self> {
        let paths = ArtifactPaths::from_model_path(model_path.as_ref());

        let labels = LabelVocabulary::load(&paths.labels)
            .with_context(|| format!("Failed to load labels {:?}", paths.labels))?;
        let classifier = ClassifierConfig::load(&paths.config).map_err(|e| {
            NemoError::Model(format!("failed to load {:?}: {:?}", paths.config, e))
        })?;
        if classifier.num_classes != labels.len() {
            return Err(NemoError::Model(format!(
                "model has {} outputs but {:?} lists {} labels",
                classifier.num_classes,
                paths.labels,
                labels.len()
            ))
            .into());
        }

        let model = classifier
            .init::<B>(&device)
            .load_file(
                paths.model.clone(),
                &NamedMpkFileRecorder::<FullPrecisionSettings>::new(),
                &device,
            )
            .map_err(|e| NemoError::Model(format!("failed to load {:?}: {:?}", paths.model, e)))?;
        debug!("Loaded model {:?} with labels {:?}", paths.model, labels.names());

        Ok(Self::new(model, labels, image_size, device))
    }

    pub fn labels(&self) -> &LabelVocabulary {
        &self.labels
    }

    /// Classify each image in order, `batch_size` images at a time
    pub fn classify<P: AsRef<Path>>(&self, paths: &[P]) -> Result<Vec<Prediction>> {
        let mut predictions = Vec::with_capacity(paths.len());
        for chunk in paths.chunks(self.batch_size) {
            predictions.extend(self.classify_batch(chunk)?);
        }
        Ok(predictions)
    }

    fn classify_batch<P: AsRef<Path>>(&self, paths: &[P]) -> Result<Vec<Prediction>> {
        let num_classes = self.labels.len();
        let batcher = PatchBatcher::new(self.image_size, num_classes);

        let mut samples = Vec::with_capacity(paths.len());
        for path in paths {
            let image = load_and_preprocess(path.as_ref(), self.image_size)?;
            samples.push(Sample {
                image,
                label: 0,
                target: vec![0.0; num_classes],
            });
        }
        if samples.is_empty() {
            return Ok(Vec::new());
        }

        let batch: PatchBatch<B> = batcher.batch(samples, &self.device);
        let probabilities = self
            .model
            .predict(batch.images)
            .into_data()
            .to_vec::<f32>()
            .map_err(|e| NemoError::Model(format!("unreadable model output: {:?}", e)))?;
        debug!("Classified {} images", paths.len());

        paths
            .iter()
            .zip(probabilities.chunks(num_classes))
            .map(|(path, row)| -> Result<Prediction> {
                let (index, confidence) = row
                    .iter()
                    .copied()
                    .enumerate()
                    .fold((0, f32::MIN), |best, (i, p)| if p > best.1 { (i, p) } else { best });
                let label = self
                    .labels
                    .name(index)
                    .ok_or_else(|| NemoError::Model(format!("no label for class {}", index)))?;

                Ok(Prediction {
                    path: path.as_ref().to_path_buf(),
                    label: label.to_string(),
                    index,
                    confidence,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trainer::save_model;
    use burn::backend::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_save_load_classify() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let device = Default::default();
        let labels = LabelVocabulary::from_names(["bad", "good"]);
        let classifier = ClassifierConfig::new(2)
            .with_hidden_units(4)
            .with_backbone_width(2);
        let model = classifier.init::<TestBackend>(&device);

        let paths = save_model(model, &classifier, &labels, dir.path(), "nemo--test--0.50")?;
        assert!(paths.model.is_file());

        let image_path = dir.path().join("patch.png");
        image::RgbImage::from_pixel(40, 40, image::Rgb([90, 120, 30])).save(&image_path)?;

        let predictor = Predictor::<TestBackend>::load(&paths.model, 32, device)?;
        let predictions = predictor.classify(&[&image_path, &image_path])?;

        assert_eq!(predictions.len(), 2);
        assert_eq!(predictions[0], predictions[1]);
        let prediction = &predictions[0];
        assert!(prediction.confidence >= 0.5 && prediction.confidence <= 1.0);
        assert_eq!(labels.name(prediction.index), Some(prediction.label.as_str()));
        Ok(())
    }

    #[test]
    fn test_classify_in_several_batches_keeps_order() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let device = Default::default();
        let labels = LabelVocabulary::from_names(["bad", "good"]);
        let classifier = ClassifierConfig::new(2)
            .with_hidden_units(4)
            .with_backbone_width(2);
        let model = classifier.init::<TestBackend>(&device);
        let paths = save_model(model, &classifier, &labels, dir.path(), "nemo--batches--0.50")?;

        let mut images = Vec::new();
        for (i, shade) in [0u8, 60, 120, 180, 240].into_iter().enumerate() {
            let path = dir.path().join(format!("patch{}.png", i));
            image::RgbImage::from_pixel(32, 32, image::Rgb([shade, 255 - shade, shade / 2]))
                .save(&path)?;
            images.push(path);
        }

        let predictor =
            Predictor::<TestBackend>::load(&paths.model, 32, device)?.with_batch_size(2);
        let predictions = predictor.classify(&images)?;

        assert_eq!(predictions.len(), images.len());
        for (prediction, path) in predictions.iter().zip(&images) {
            assert_eq!(&prediction.path, path);
            let single = predictor.classify(&[path])?;
            assert_eq!(single[0].index, prediction.index);
            assert!((single[0].confidence - prediction.confidence).abs() < 1e-4);
        }
        Ok(())
    }

    #[test]
    fn test_load_rejects_label_count_mismatch() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let device = Default::default();
        let classifier = ClassifierConfig::new(3).with_backbone_width(2);
        let model = classifier.init::<TestBackend>(&device);
        let labels = LabelVocabulary::from_names(["a", "b"]);

        let paths = save_model(model, &classifier, &labels, dir.path(), "mismatch")?;
        let err = Predictor::<TestBackend>::load(&paths.model, 32, device)
            .err()
            .expect("label count mismatch must fail");
        assert!(matches!(
            err.downcast_ref::<NemoError>(),
            Some(NemoError::Model(_))
        ));
        Ok(())
    }
}
