//! Connected-component labelling of binary masks

use crate::bbox::BBox;
use crate::Result;
use anyhow::{Context, ensure};
use opencv::{
    core::{Mat, CV_32S},
    imgproc::{self, CC_STAT_AREA, CC_STAT_HEIGHT, CC_STAT_LEFT, CC_STAT_TOP, CC_STAT_WIDTH},
    prelude::*,
};
use serde::Serialize;

/// Label reserved for background pixels
pub const BACKGROUND: i32 = 0;

/// Per-label statistics reported by the labelling pass
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ComponentStats {
    pub bbox: BBox,
    /// Pixel count
    pub area: i32,
    /// Centroid as (x, y)
    pub centroid: (f64, f64),
}

impl ComponentStats {
    /// Centroid truncated to whole pixels
    pub fn centroid_px(&self) -> (i32, i32) {
        (self.centroid.0 as i32, self.centroid.1 as i32)
    }
}

/// Output of 8-connected component labelling
pub struct ConnectedComponents {
    /// Same size as the mask; each pixel holds its label (CV_32S)
    pub labels: Mat,
    /// Indexed by label, including background at index 0
    pub stats: Vec<ComponentStats>,
}

impl ConnectedComponents {
    /// Label every 8-connected foreground region of `mask`
    pub fn analyze(mask: &Mat) -> Result<Self> {
        let mut labels = Mat::default();
        let mut stats = Mat::default();
        let mut centroids = Mat::default();

        let count = imgproc::connected_components_with_stats(
            mask,
            &mut labels,
            &mut stats,
            &mut centroids,
            8,
            CV_32S,
        )
        .context("Connected component labelling failed")?;

        let mut component_stats = Vec::with_capacity(count.max(0) as usize);
        for label in 0..count {
            let stat = |column: i32| -> Result<i32> { Ok(*stats.at_2d::<i32>(label, column)?) };

            component_stats.push(ComponentStats {
                bbox: BBox::new(
                    stat(CC_STAT_LEFT)?,
                    stat(CC_STAT_TOP)?,
                    stat(CC_STAT_WIDTH)?,
                    stat(CC_STAT_HEIGHT)?,
                ),
                area: stat(CC_STAT_AREA)?,
                centroid: (
                    *centroids.at_2d::<f64>(label, 0)?,
                    *centroids.at_2d::<f64>(label, 1)?,
                ),
            });
        }

        Ok(Self {
            labels,
            stats: component_stats,
        })
    }

    /// Number of labels, background included
    pub fn count(&self) -> usize {
        self.stats.len()
    }

    /// Foreground labels with their statistics
    pub fn foreground(&self) -> impl Iterator<Item = (i32, &ComponentStats)> {
        self.stats
            .iter()
            .enumerate()
            .skip(1)
            .map(|(label, stats)| (label as i32, stats))
    }

    /// Foreground label with the largest pixel area; ties go to the lowest label
    pub fn largest_component(&self) -> Option<i32> {
        self.foreground()
            .fold(None, |best: Option<(i32, i32)>, (label, stats)| match best {
                Some((_, area)) if area >= stats.area => best,
                _ => Some((label, stats.area)),
            })
            .map(|(label, _)| label)
    }

    /// Zero every pixel of `mask` whose label satisfies `predicate`.
    /// Background is never passed to the predicate. Returns the number of
    /// mask pixels that changed.
    pub fn zero_where<F>(&self, mask: &mut Mat, mut predicate: F) -> Result<usize>
    where
        F: FnMut(i32) -> bool,
    {
        ensure!(
            mask.size()? == self.labels.size()?,
            "Mask size {:?} does not match label map size {:?}",
            mask.size()?,
            self.labels.size()?
        );

        let labels = self.labels.data_typed::<i32>()?;
        let pixels = mask.data_typed_mut::<u8>()?;

        let mut changed = 0;
        for (pixel, &label) in pixels.iter_mut().zip(labels) {
            if label != BACKGROUND && predicate(label) {
                if *pixel != 0 {
                    changed += 1;
                }
                *pixel = 0;
            }
        }

        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::ImageUtils;

    // Two blobs: a 2x2 square and a 3x1 bar, plus a diagonal neighbour of
    // the square that 8-connectivity must join to it.
    fn sample_mask() -> Result<Mat> {
        #[rustfmt::skip]
        let pixels = [
            255, 255, 0, 0, 0, 0,
            255, 255, 0, 0, 0, 0,
            0,   0, 255, 0, 0, 0,
            0,   0,   0, 0, 0, 0,
            0,   0,   0, 255, 255, 255,
        ];
        ImageUtils::gray_from_slice(5, 6, &pixels)
    }

    #[test]
    fn test_analyze_counts_background() -> Result<()> {
        let components = ConnectedComponents::analyze(&sample_mask()?)?;
        assert_eq!(components.count(), 3);
        assert_eq!(components.stats[1].area, 5);
        assert_eq!(components.stats[2].area, 3);
        assert_eq!(components.stats[2].bbox, BBox::new(3, 4, 3, 1));
        assert_eq!(components.stats[2].centroid_px(), (4, 4));
        Ok(())
    }

    #[test]
    fn test_largest_component_skips_background() -> Result<()> {
        let components = ConnectedComponents::analyze(&sample_mask()?)?;
        // Background has the largest area but is never selected
        assert!(components.stats[0].area > components.stats[1].area);
        assert_eq!(components.largest_component(), Some(1));
        Ok(())
    }

    #[test]
    fn test_largest_component_empty_mask() -> Result<()> {
        let mask = ImageUtils::gray_from_slice(4, 4, &[0; 16])?;
        let components = ConnectedComponents::analyze(&mask)?;
        assert_eq!(components.count(), 1);
        assert_eq!(components.largest_component(), None);
        Ok(())
    }

    #[test]
    fn test_zero_where() -> Result<()> {
        let mut mask = sample_mask()?;
        let components = ConnectedComponents::analyze(&mask)?;

        let changed = components.zero_where(&mut mask, |label| label == 2)?;
        assert_eq!(changed, 3);
        assert_eq!(opencv::core::count_non_zero(&mask)?, 5);
        Ok(())
    }
}
