//! Training configuration

use crate::Result;
use anyhow::Context;
use nemo_core::{NemoError, Prefetch};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Hyperparameters and data-loading settings of a training run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Side length images are resized to before entering the network
    pub image_size: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    pub epochs: usize,
    /// Passes over the training split per epoch
    pub steps_multiplier: usize,
    pub hidden_units: usize,
    /// Channel width of the first backbone block; 64 matches VGG16
    pub backbone_width: usize,
    /// Extension of the patch images, without the dot
    pub image_extension: String,
    pub prefetch: Prefetch,
    pub seed: u64,
    /// RMSprop smoothing constant
    pub rms_rho: f32,
    pub rms_epsilon: f32,
    pub augment: AugmentConfig,
}

/// Random augmentations applied to training images only
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AugmentConfig {
    pub flip_horizontal: bool,
    pub flip_vertical: bool,
    /// Rotate by a random multiple of 90 degrees
    pub rotate: bool,
    /// Brightness shifts are drawn from `[-delta, delta]`
    pub max_brightness_delta: f32,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            image_size: 224,
            batch_size: 32,
            learning_rate: 0.0005,
            epochs: 100,
            steps_multiplier: 4,
            hidden_units: 64,
            backbone_width: 64,
            image_extension: "png".to_string(),
            prefetch: Prefetch::Auto,
            seed: 42,
            rms_rho: 0.9,
            rms_epsilon: 1e-7,
            augment: AugmentConfig::default(),
        }
    }
}

impl Default for AugmentConfig {
    fn default() -> Self {
        Self {
            flip_horizontal: true,
            flip_vertical: true,
            rotate: true,
            max_brightness_delta: 0.1,
        }
    }
}

impl TrainingConfig {
    /// Load from a JSON file; missing fields keep their defaults
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| NemoError::io(path, e))
            .with_context(|| format!("Failed to read training config: {:?}", path))?;
        let config: Self = serde_json::from_str(&text)
            .map_err(NemoError::from)
            .with_context(|| format!("Invalid training config: {:?}", path))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> nemo_core::Result<()> {
        let positive = [
            ("image_size", self.image_size),
            ("batch_size", self.batch_size),
            ("steps_multiplier", self.steps_multiplier),
            ("hidden_units", self.hidden_units),
            ("backbone_width", self.backbone_width),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(NemoError::Config(format!("{} must be positive", name)));
            }
        }

        // Five 2x2 poolings must leave at least one pixel
        if self.image_size < 32 {
            return Err(NemoError::Config(format!(
                "image_size must be at least 32, got {}",
                self.image_size
            )));
        }

        if !(self.learning_rate > 0.0) {
            return Err(NemoError::Config(format!(
                "learning_rate must be positive, got {}",
                self.learning_rate
            )));
        }

        if self.augment.max_brightness_delta < 0.0 {
            return Err(NemoError::Config(
                "max_brightness_delta must not be negative".to_string(),
            ));
        }

        Ok(())
    }

    /// Optimisation steps per epoch for a training split of `train_count` images
    pub fn steps_per_epoch(&self, train_count: usize) -> usize {
        (train_count / self.batch_size) * self.steps_multiplier
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TrainingConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.batch_size, 32);
        assert_eq!(config.learning_rate, 0.0005);
        assert_eq!(config.prefetch, Prefetch::Auto);
    }

    #[test]
    fn test_steps_per_epoch() {
        let config = TrainingConfig::default();
        assert_eq!(config.steps_per_epoch(100), 12);
        assert_eq!(config.steps_per_epoch(64), 8);
        assert_eq!(config.steps_per_epoch(31), 0);
    }

    #[test]
    fn test_validate_rejects_zero_batch() {
        let config = TrainingConfig {
            batch_size: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(NemoError::Config(_))));
    }

    #[test]
    fn test_from_file_partial() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("train.json");
        std::fs::write(
            &path,
            r#"{"epochs": 3, "prefetch": {"Buffer": 4}, "augment": {"rotate": false}}"#,
        )?;

        let config = TrainingConfig::from_file(&path)?;
        assert_eq!(config.epochs, 3);
        assert_eq!(config.prefetch, Prefetch::Buffer(4));
        assert!(!config.augment.rotate);
        assert!(config.augment.flip_horizontal);
        assert_eq!(config.batch_size, 32);
        Ok(())
    }
}
