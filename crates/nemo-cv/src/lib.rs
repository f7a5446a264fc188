//! Nemo Computer Vision Library
//!
//! OpenCV-backed preprocessing: segments individual specimens out of
//! scanned plate images and crops fixed-size patches around them.

pub mod bbox;
pub mod components;
pub mod mask;
pub mod patch;
pub mod segmentation;
pub mod suppress;
pub mod utils;
pub mod visualize;

// Re-export commonly used types
pub use bbox::BBox;
pub use components::{ComponentStats, ConnectedComponents};
pub use patch::{crop_axis, crop_window, extract_patch};
pub use segmentation::{
    run_preprocess, ObjectRegion, PlateReport, PlateSegmenter, PreprocessSummary,
    SegmentationConfig,
};
pub use utils::ImageUtils;

// Error handling
pub type Result<T> = anyhow::Result<T>;
