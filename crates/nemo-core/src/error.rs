//! Error taxonomy shared by the preprocessing and training stages

use std::path::PathBuf;
use thiserror::Error;

/// Image axis, used to report which dimension made a crop impossible
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Rows,
    Cols,
}

impl std::fmt::Display for Axis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Axis::Rows => write!(f, "rows"),
            Axis::Cols => write!(f, "cols"),
        }
    }
}

/// Errors raised by the nemo pipeline
#[derive(Error, Debug)]
pub enum NemoError {
    /// Filesystem failure on a specific path
    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// An image file could not be decoded
    #[error("failed to decode image {path:?}: {reason}")]
    Decode { path: PathBuf, reason: String },

    /// A class directory name is missing from the label vocabulary
    #[error("label '{label}' of {path:?} is not in the label vocabulary")]
    LabelMismatch { label: String, path: PathBuf },

    /// The image is smaller than the requested patch on some axis
    #[error("image too small to crop: {axis} extent {image_extent} < patch extent {patch_extent}")]
    DegenerateCrop {
        axis: Axis,
        image_extent: i32,
        patch_extent: i32,
    },

    /// A dataset split directory contains no usable images
    #[error("no images found in {path:?}")]
    EmptySplit { path: PathBuf },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("model error: {0}")]
    Model(String),
}

impl NemoError {
    /// Wrap an I/O error with the path it happened on
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        NemoError::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, NemoError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_degenerate_crop_display() {
        let err = NemoError::DegenerateCrop {
            axis: Axis::Cols,
            image_extent: 100,
            patch_extent: 224,
        };
        assert_eq!(
            err.to_string(),
            "image too small to crop: cols extent 100 < patch extent 224"
        );
    }

    #[test]
    fn test_io_error_keeps_path() {
        let source = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err = NemoError::io("plates/a.tiff", source);
        assert!(matches!(&err, NemoError::Io { path, .. } if path.ends_with("a.tiff")));
        assert!(err.to_string().contains("a.tiff"));
    }
}
