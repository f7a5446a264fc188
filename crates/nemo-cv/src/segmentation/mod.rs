//! Plate-level segmentation driver

pub mod config;
pub mod segmenter;

pub use config::{OverlayConfig, SegmentationConfig};
pub use segmenter::{
    discover_sources, run_preprocess, ObjectRegion, PlateReport, PlateSegmenter,
    PreprocessSummary, Segmentation,
};
