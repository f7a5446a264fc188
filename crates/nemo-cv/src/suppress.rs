//! Mask cleanup: scanner border, tile edges and small specks

use crate::components::ConnectedComponents;
use crate::Result;
use opencv::{
    core::{Mat, Rect, Scalar},
    imgproc::{self, FILLED, LINE_8},
    prelude::*,
};
use tracing::{debug, warn};

/// Zero the scanner border in `object_mask`.
///
/// The border is taken to be the largest foreground component of
/// `border_components`, which must be labelled from a mask of the same
/// image built with the border blur/threshold. Returns the border label,
/// or `None` when the border mask had no foreground at all.
pub fn suppress_border(
    object_mask: &mut Mat,
    border_components: &ConnectedComponents,
) -> Result<Option<i32>> {
    let Some(border_label) = border_components.largest_component() else {
        warn!("Border mask has no foreground; skipping border removal");
        return Ok(None);
    };

    let zeroed = border_components.zero_where(object_mask, |label| label == border_label)?;
    debug!("Border label {} cleared {} object pixels", border_label, zeroed);

    Ok(Some(border_label))
}

/// Zero mask pixels within `margin` of the image edges.
///
/// Top rows `[0, margin)` and left columns `[0, margin)` are cleared; at
/// the bottom and right the cleared band is `[extent - margin, extent - 1)`,
/// so the very last row and column keep their values. A margin of 0
/// clears nothing, unlike a negative-zero slice `[-0:-1]`, which would
/// clear everything but the last row and column.
pub fn suppress_edge_margin(mask: &mut Mat, margin: i32) -> Result<()> {
    if margin <= 0 {
        return Ok(());
    }

    let rows = mask.rows();
    let cols = mask.cols();

    let top = margin.min(rows);
    let bottom_start = (rows - margin).max(0);
    let left = margin.min(cols);
    let right_start = (cols - margin).max(0);

    let bands = [
        Rect::new(0, 0, cols, top),
        Rect::new(0, bottom_start, cols, rows - 1 - bottom_start),
        Rect::new(0, 0, left, rows),
        Rect::new(right_start, 0, cols - 1 - right_start, rows),
    ];

    for band in bands {
        fill_zero(mask, band)?;
    }

    Ok(())
}

/// Remove components smaller than `min_pixels` from `mask`.
///
/// Returns the labels that survive, in label order.
pub fn filter_small_objects(
    mask: &mut Mat,
    components: &ConnectedComponents,
    min_pixels: i32,
) -> Result<Vec<i32>> {
    let mut small = vec![false; components.count()];
    let mut kept = Vec::new();

    for (label, stats) in components.foreground() {
        if stats.area < min_pixels {
            small[label as usize] = true;
        } else {
            kept.push(label);
        }
    }

    let removed = small.iter().filter(|&&s| s).count();
    if removed > 0 {
        components.zero_where(mask, |label| small[label as usize])?;
    }
    debug!("Kept {} objects, dropped {} below {} pixels", kept.len(), removed, min_pixels);

    Ok(kept)
}

fn fill_zero(mask: &mut Mat, band: Rect) -> Result<()> {
    if band.width <= 0 || band.height <= 0 {
        return Ok(());
    }

    imgproc::rectangle(mask, band, Scalar::all(0.0), FILLED, LINE_8, 0)?;
    Ok(())
}
