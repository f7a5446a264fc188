//! Segmentation configuration

use crate::bbox::bgr_scalar;
use crate::Result;
use anyhow::Context;
use nemo_core::NemoError;
use opencv::core::{Scalar, Size};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Parameters of the plate segmentation pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentationConfig {
    /// Threshold of the mask used to find the scanner border
    pub border_threshold: i32,
    /// Threshold of the mask used to find objects
    pub object_threshold: i32,
    /// Width of the edge band cleared of objects, in pixels
    pub image_margin: i32,
    pub border_blur: i32,
    pub object_blur: i32,
    /// Objects with fewer pixels are dropped
    pub min_object_pixels: i32,
    pub patch_width: i32,
    pub patch_height: i32,
    /// Extension of the plate scans to pick up, without the dot
    pub source_extension: String,
    pub overlay: OverlayConfig,
}

/// Debug rendering parameters; colours are RGB
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlayConfig {
    pub alpha: f64,
    pub mask_rgb: (u8, u8, u8),
    pub bbox_rgb: (u8, u8, u8),
    pub bbox_thickness: i32,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            border_threshold: 70,
            object_threshold: 120,
            image_margin: 122,
            border_blur: 75,
            object_blur: 31,
            min_object_pixels: 1024,
            patch_width: 224,
            patch_height: 224,
            source_extension: "tiff".to_string(),
            overlay: OverlayConfig::default(),
        }
    }
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            alpha: 0.5,
            mask_rgb: (255, 0, 127),
            bbox_rgb: (255, 0, 0),
            bbox_thickness: 2,
        }
    }
}

impl OverlayConfig {
    pub fn mask_color(&self) -> Scalar {
        bgr_scalar(self.mask_rgb)
    }

    pub fn bbox_color(&self) -> Scalar {
        bgr_scalar(self.bbox_rgb)
    }
}

impl SegmentationConfig {
    /// Load from a JSON file; missing fields keep their defaults
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| NemoError::io(path, e))
            .with_context(|| format!("Failed to read segmentation config: {:?}", path))?;
        let config: Self = serde_json::from_str(&text)
            .map_err(NemoError::from)
            .with_context(|| format!("Invalid segmentation config: {:?}", path))?;
        config.validate()?;
        Ok(config)
    }

    pub fn patch_size(&self) -> Size {
        Size::new(self.patch_width, self.patch_height)
    }

    /// Reject parameter values the OpenCV calls or the cropper cannot use
    pub fn validate(&self) -> nemo_core::Result<()> {
        for (name, value) in [
            ("border_threshold", self.border_threshold),
            ("object_threshold", self.object_threshold),
        ] {
            if !(0..=255).contains(&value) {
                return Err(NemoError::Config(format!(
                    "{} must be within 0..=255, got {}",
                    name, value
                )));
            }
        }

        for (name, value) in [("border_blur", self.border_blur), ("object_blur", self.object_blur)] {
            if value < 3 || value % 2 == 0 {
                return Err(NemoError::Config(format!(
                    "{} must be an odd kernel size >= 3, got {}",
                    name, value
                )));
            }
        }

        for (name, value) in [("patch_width", self.patch_width), ("patch_height", self.patch_height)] {
            if value <= 0 || value % 2 != 0 {
                return Err(NemoError::Config(format!(
                    "{} must be a positive even size, got {}",
                    name, value
                )));
            }
        }

        if self.image_margin < 0 {
            return Err(NemoError::Config(format!(
                "image_margin must not be negative, got {}",
                self.image_margin
            )));
        }

        if !(0.0..=1.0).contains(&self.overlay.alpha) {
            return Err(NemoError::Config(format!(
                "overlay alpha must be within 0..=1, got {}",
                self.overlay.alpha
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = SegmentationConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.patch_size(), Size::new(224, 224));
    }

    #[test]
    fn test_overlay_colors_are_bgr() {
        let overlay = OverlayConfig::default();
        assert_eq!(overlay.mask_color().0[..3], [127.0, 0.0, 255.0]);
        assert_eq!(overlay.bbox_color().0[..3], [0.0, 0.0, 255.0]);
    }

    #[test]
    fn test_validate_rejects_even_blur() {
        let config = SegmentationConfig {
            object_blur: 30,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(NemoError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_threshold_range() {
        let config = SegmentationConfig {
            border_threshold: 300,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_file_fills_defaults() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("segmentation.json");
        std::fs::write(&path, r#"{"image_margin": 10, "overlay": {"alpha": 0.25}}"#)?;

        let config = SegmentationConfig::from_file(&path)?;
        assert_eq!(config.image_margin, 10);
        assert_eq!(config.object_threshold, 120);
        assert_eq!(config.overlay.alpha, 0.25);
        assert_eq!(config.overlay.bbox_thickness, 2);
        Ok(())
    }
}
