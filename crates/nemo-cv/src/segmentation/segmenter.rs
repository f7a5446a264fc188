//! Plate segmentation: masks -> components -> filters -> patches

use super::config::SegmentationConfig;
use crate::bbox::BBox;
use crate::components::{ComponentStats, ConnectedComponents};
use crate::mask::binary_mask;
use crate::patch::extract_patch;
use crate::suppress::{filter_small_objects, suppress_border, suppress_edge_margin};
use crate::utils::ImageUtils;
use crate::visualize::{draw_bounding_boxes, mask_overlay};
use crate::Result;
use anyhow::Context;
use nemo_core::{find_files, NemoError};
use opencv::{core::Mat, prelude::*};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// A specimen that survived every filter
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ObjectRegion {
    /// Label in the final object labelling
    pub label: i32,
    /// Box, pixel area and centroid of the component
    pub stats: ComponentStats,
}

/// Result of segmenting one plate image
pub struct Segmentation {
    /// Final object mask, after every suppression pass
    pub mask: Mat,
    /// Surviving objects in label order
    pub regions: Vec<ObjectRegion>,
    /// Label of the border in the border labelling, if one was found
    pub border_label: Option<i32>,
}

/// Files written for one source image
#[derive(Debug, Clone, Serialize)]
pub struct PlateReport {
    pub source: PathBuf,
    pub patches: Vec<PathBuf>,
}

/// Outcome of a whole preprocessing run
#[derive(Debug, Clone, Default, Serialize)]
pub struct PreprocessSummary {
    pub images: usize,
    pub patches: usize,
    pub reports: Vec<PlateReport>,
}

/// Segments specimens out of plate scans
pub struct PlateSegmenter {
    config: SegmentationConfig,
}

impl PlateSegmenter {
    pub fn new(config: SegmentationConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &SegmentationConfig {
        &self.config
    }

    /// Build the object mask of `image` and list the objects it contains
    pub fn segment(&self, image: &Mat) -> Result<Segmentation> {
        let config = &self.config;

        let border_mask = binary_mask(image, config.border_blur, config.border_threshold as u8)
            .context("Failed to build border mask")?;
        let border_components = ConnectedComponents::analyze(&border_mask)?;

        let mut mask = binary_mask(image, config.object_blur, config.object_threshold as u8)
            .context("Failed to build object mask")?;
        let border_label = suppress_border(&mut mask, &border_components)?;
        suppress_edge_margin(&mut mask, config.image_margin)?;

        let components = ConnectedComponents::analyze(&mask)?;
        let kept = filter_small_objects(&mut mask, &components, config.min_object_pixels)?;

        let regions = kept
            .into_iter()
            .map(|label| ObjectRegion {
                label,
                stats: components.stats[label as usize],
            })
            .collect();

        Ok(Segmentation {
            mask,
            regions,
            border_label,
        })
    }

    /// One fixed-size patch per region, in region order
    pub fn extract_patches(&self, image: &Mat, segmentation: &Segmentation) -> Result<Vec<Mat>> {
        segmentation
            .regions
            .iter()
            .map(|region| {
                extract_patch(image, region.stats.centroid_px(), self.config.patch_size()).with_context(
                    || format!("Failed to crop patch around object {}", region.label),
                )
            })
            .collect()
    }

    /// Segment one source image and write its mask, overlay, patches and
    /// bounding-box rendering into `output_dir`.
    pub fn process_file<P: AsRef<Path>, Q: AsRef<Path>>(
        &self,
        path: P,
        output_dir: Q,
    ) -> Result<PlateReport> {
        let path = path.as_ref();
        let output_dir = output_dir.as_ref();
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .ok_or_else(|| NemoError::Config(format!("source has no file name: {:?}", path)))?;
        let output_path = |suffix: &str| output_dir.join(format!("{}-{}.png", stem, suffix));

        let image = ImageUtils::load_color(path)?;
        let segmentation = self
            .segment(&image)
            .with_context(|| format!("Failed to segment {:?}", path))?;
        debug!(
            "{:?}: border label {:?}, {} objects",
            path,
            segmentation.border_label,
            segmentation.regions.len()
        );

        ImageUtils::save_image(&segmentation.mask, output_path("binary"))?;

        let overlay = &self.config.overlay;
        let overlay_image = mask_overlay(
            &image,
            &segmentation.mask,
            overlay.mask_color(),
            overlay.alpha,
        )?;
        ImageUtils::save_image(&overlay_image, output_path("overlay"))?;

        let patches = self
            .extract_patches(&image, &segmentation)
            .with_context(|| format!("Failed to extract patches from {:?}", path))?;
        let mut patch_paths = Vec::with_capacity(patches.len());
        for (index, patch) in patches.iter().enumerate() {
            let patch_path = output_path(&format!("patch{:02}", index + 1));
            ImageUtils::save_image(patch, &patch_path)?;
            debug!("Wrote {:?}", patch_path);
            patch_paths.push(patch_path);
        }

        let boxes: Vec<BBox> = segmentation.regions.iter().map(|r| r.stats.bbox).collect();
        let bbox_image =
            draw_bounding_boxes(&image, &boxes, overlay.bbox_color(), overlay.bbox_thickness)?;
        ImageUtils::save_image(&bbox_image, output_path("bbox"))?;

        Ok(PlateReport {
            source: path.to_path_buf(),
            patches: patch_paths,
        })
    }
}

/// Source images below `dir` with the given extension, sorted by path
pub fn discover_sources<P: AsRef<Path>>(dir: P, extension: &str) -> Result<Vec<PathBuf>> {
    let dir = dir.as_ref();
    let sources = find_files(dir, extension)
        .with_context(|| format!("Failed to list source images in {:?}", dir))?;
    Ok(sources)
}

/// Process every source image under `source_dir` into a freshly emptied
/// `output_dir`. The first failure aborts the run.
pub fn run_preprocess<P: AsRef<Path>, Q: AsRef<Path>>(
    source_dir: P,
    output_dir: Q,
    config: SegmentationConfig,
) -> Result<PreprocessSummary> {
    let source_dir = source_dir.as_ref();
    let output_dir = output_dir.as_ref();
    let segmenter = PlateSegmenter::new(config)?;

    if output_dir.exists() {
        fs::remove_dir_all(output_dir).map_err(|e| NemoError::io(output_dir, e))?;
    }
    fs::create_dir_all(output_dir).map_err(|e| NemoError::io(output_dir, e))?;

    info!("Source directory: {:?}", source_dir);
    let sources = discover_sources(source_dir, &segmenter.config().source_extension)?;
    info!("Found {} source images", sources.len());

    let mut summary = PreprocessSummary::default();
    for source in &sources {
        info!("Processing {:?}", source);
        let report = segmenter.process_file(source, output_dir)?;
        info!("{:?}: {} patches", source, report.patches.len());

        summary.images += 1;
        summary.patches += report.patches.len();
        summary.reports.push(report);
    }

    info!(
        "Preprocessed {} images into {} patches",
        summary.images, summary.patches
    );
    Ok(summary)
}
