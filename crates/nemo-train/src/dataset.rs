//! Labeled patch datasets: one split directory per stage, one
//! subdirectory per class.

use crate::config::{AugmentConfig, TrainingConfig};
use crate::images::{augment, load_and_preprocess, ImageTensor};
use crate::Result;
use anyhow::Context;
use nemo_core::{find_files, LabelVocabulary, NemoError, Pipeline, Prefetch};
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// An image file and the class index of its parent directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabeledFile {
    pub path: PathBuf,
    pub label: usize,
}

/// A decoded example ready for batching
#[derive(Debug, Clone)]
pub struct Sample {
    pub image: ImageTensor,
    pub label: usize,
    /// One-hot encoding of `label`
    pub target: Vec<f32>,
}

/// How a split is turned into a stream of batches
#[derive(Debug, Clone)]
pub struct StreamOptions {
    pub batch_size: usize,
    pub image_size: usize,
    /// Augmentations to apply, `None` for validation and test data
    pub augment: Option<AugmentConfig>,
    pub prefetch: Prefetch,
}

impl StreamOptions {
    pub fn training(config: &TrainingConfig) -> Self {
        Self {
            batch_size: config.batch_size,
            image_size: config.image_size,
            augment: Some(config.augment.clone()),
            prefetch: config.prefetch,
        }
    }

    pub fn evaluation(config: &TrainingConfig) -> Self {
        Self {
            augment: None,
            ..Self::training(config)
        }
    }
}

/// Batches of decoded samples; a decode failure surfaces as an `Err` batch
pub type BatchStream = Pipeline<nemo_core::Result<Vec<Sample>>>;

/// All files of one split, labeled through the shared vocabulary
#[derive(Debug, Clone)]
pub struct SplitDataset {
    dir: PathBuf,
    files: Arc<Vec<LabeledFile>>,
    labels: Arc<LabelVocabulary>,
}

impl SplitDataset {
    /// Collect every `extension` file below `dir`, sorted by path, labeled
    /// by its parent directory name.
    pub fn from_dir<P: AsRef<Path>>(
        dir: P,
        labels: &LabelVocabulary,
        extension: &str,
    ) -> nemo_core::Result<Self> {
        let dir = dir.as_ref();
        let paths = find_files(dir, extension)?;
        if paths.is_empty() {
            return Err(NemoError::EmptySplit {
                path: dir.to_path_buf(),
            });
        }

        let mut files = Vec::with_capacity(paths.len());
        for path in paths {
            let class = path
                .parent()
                .and_then(Path::file_name)
                .map(|name| name.to_string_lossy().to_string())
                .unwrap_or_default();
            let label = labels.index(&class, &path)?;
            files.push(LabeledFile { path, label });
        }

        debug!("{:?}: {} files", dir, files.len());
        Ok(Self {
            dir: dir.to_path_buf(),
            files: Arc::new(files),
            labels: Arc::new(labels.clone()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn files(&self) -> &[LabeledFile] {
        &self.files
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// One shuffled pass over the split:
    /// shuffle -> decode -> [augment] -> batch -> prefetch
    pub fn stream(&self, options: &StreamOptions, seed: u64) -> BatchStream {
        let prefetch = options.prefetch;
        self.pass(options, seed).prefetch(prefetch)
    }

    /// Endless stream of passes, each reshuffled with a fresh seed
    pub fn repeat(&self, options: &StreamOptions, seed: u64) -> BatchStream {
        let split = self.clone();
        let pass_options = options.clone();
        let mut pass = 0u64;

        Pipeline::repeat_with(move || {
            let pipeline = split.pass(&pass_options, seed.wrapping_add(pass));
            pass += 1;
            pipeline
        })
        .prefetch(options.prefetch)
    }

    fn pass(&self, options: &StreamOptions, seed: u64) -> BatchStream {
        let files: Vec<LabeledFile> = self.files.as_ref().clone();
        let buffer = files.len();
        let image_size = options.image_size;
        let labels = Arc::clone(&self.labels);
        let chunk = options.batch_size;

        let decoded = Pipeline::new(files)
            .shuffle(buffer, seed)
            .par_map(chunk, move |file: LabeledFile| -> nemo_core::Result<Sample> {
                let image = load_and_preprocess(&file.path, image_size)?;
                let target = labels.one_hot(file.label);
                Ok(Sample {
                    image,
                    label: file.label,
                    target,
                })
            });

        let samples = match options.augment.clone() {
            Some(config) => {
                // One seed per sample, drawn in stream order
                let mut seeds = StdRng::seed_from_u64(seed ^ 0x5eed);
                decoded
                    .map(move |sample| (sample, seeds.next_u64()))
                    .par_map(chunk, move |(sample, sample_seed)| -> nemo_core::Result<Sample> {
                        let mut sample: Sample = sample?;
                        let mut rng = StdRng::seed_from_u64(sample_seed);
                        sample.image = augment(sample.image, &config, &mut rng);
                        Ok(sample)
                    })
            }
            None => decoded,
        };

        samples
            .batch(options.batch_size)
            .map(|batch| batch.into_iter().collect())
    }
}

/// Split sizes and the shared vocabulary
#[derive(Debug, Clone)]
pub struct DatasetMetadata {
    pub labels: LabelVocabulary,
    pub train_count: usize,
    pub valid_count: usize,
    pub test_count: usize,
}

impl DatasetMetadata {
    pub fn steps_per_epoch(&self, config: &TrainingConfig) -> usize {
        config.steps_per_epoch(self.train_count)
    }
}

/// The three splits of a data directory
#[derive(Debug, Clone)]
pub struct Datasets {
    pub train: SplitDataset,
    pub valid: SplitDataset,
    pub test: SplitDataset,
    pub metadata: DatasetMetadata,
}

/// Load `train/`, `valid/` and `test/` below `data_dir`. The vocabulary
/// comes from the class directories of `train/` and labels all three.
pub fn load_datasets<P: AsRef<Path>>(data_dir: P, config: &TrainingConfig) -> Result<Datasets> {
    let data_dir = data_dir.as_ref();
    let train_dir = data_dir.join("train");
    let valid_dir = data_dir.join("valid");
    let test_dir = data_dir.join("test");

    let labels = LabelVocabulary::from_dir(&train_dir)
        .with_context(|| format!("Failed to read class directories of {:?}", train_dir))?;
    info!("Labels: {:?}", labels.names());

    let load = |dir: &Path| {
        SplitDataset::from_dir(dir, &labels, &config.image_extension)
            .with_context(|| format!("Failed to load split {:?}", dir))
    };
    let train = load(&train_dir)?;
    let valid = load(&valid_dir)?;
    let test = load(&test_dir)?;

    let metadata = DatasetMetadata {
        labels: labels.clone(),
        train_count: train.len(),
        valid_count: valid.len(),
        test_count: test.len(),
    };
    info!(
        "Loaded {} train, {} valid, {} test images",
        metadata.train_count, metadata.valid_count, metadata.test_count
    );

    Ok(Datasets {
        train,
        valid,
        test,
        metadata,
    })
}
