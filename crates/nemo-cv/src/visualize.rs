//! Debug renderings of a segmentation result

use crate::bbox::BBox;
use crate::Result;
use anyhow::ensure;
use opencv::{
    core::{self, Mat, Scalar},
    imgproc::{self, LINE_8},
    prelude::*,
};

/// Paint foreground pixels of the binary `mask` with `color`, then blend the painted
/// copy over `image` with weight `alpha`.
pub fn mask_overlay(image: &Mat, mask: &Mat, color: Scalar, alpha: f64) -> Result<Mat> {
    ensure!(
        image.size()? == mask.size()?,
        "Overlay mask size {:?} does not match image size {:?}",
        mask.size()?,
        image.size()?
    );

    // Binary mask: every non-zero pixel is foreground
    let mut painted = image.try_clone()?;
    painted.set_to(&color, mask)?;

    let mut overlay = Mat::default();
    core::add_weighted(&painted, alpha, image, 1.0 - alpha, 0.0, &mut overlay, -1)?;
    Ok(overlay)
}

/// Copy of `image` with an outline around every box
pub fn draw_bounding_boxes(
    image: &Mat,
    boxes: &[BBox],
    color: Scalar,
    thickness: i32,
) -> Result<Mat> {
    let mut output = image.try_clone()?;

    for bbox in boxes {
        imgproc::rectangle_points(
            &mut output,
            bbox.top_left(),
            bbox.bottom_right(),
            color,
            thickness,
            LINE_8,
            0,
        )?;
    }

    Ok(output)
}
