//! Fixed-size patch cropping around object centroids

use crate::bbox::BBox;
use crate::Result;
use nemo_core::{Axis, NemoError};
use opencv::{
    core::{Mat, Size},
    prelude::*,
};

/// Crop window `[start, end)` on one axis.
///
/// The window is centred on `center` unless that would leave
/// `[0, extent)`, in which case it is shifted inward, never resized.
/// Fails with [`NemoError::DegenerateCrop`] when `extent < patch`.
pub fn crop_axis(axis: Axis, center: i32, extent: i32, patch: i32) -> nemo_core::Result<(i32, i32)> {
    if extent < patch {
        return Err(NemoError::DegenerateCrop {
            axis,
            image_extent: extent,
            patch_extent: patch,
        });
    }

    let half = patch / 2;
    let mut center = center;

    if center - half < 0 {
        center += center - half;
        center = center.max(half);
    } else if center + half > extent {
        center -= extent - (center + half);
        center = center.min(extent - half);
    }

    Ok((center - half, center + half))
}

/// Crop window for a patch of `patch` size around `centroid` (x, y)
pub fn crop_window(centroid: (i32, i32), image: Size, patch: Size) -> nemo_core::Result<BBox> {
    let (x0, x1) = crop_axis(Axis::Cols, centroid.0, image.width, patch.width)?;
    let (y0, y1) = crop_axis(Axis::Rows, centroid.1, image.height, patch.height)?;
    Ok(BBox::new(x0, y0, x1 - x0, y1 - y0))
}

/// Copy of the `patch`-sized region of `image` around `centroid`
pub fn extract_patch(image: &Mat, centroid: (i32, i32), patch: Size) -> Result<Mat> {
    let size = image.size()?;
    let window = crop_window(centroid, size, patch)?;
    debug_assert!(window.fits_within(size.width, size.height));
    let region = Mat::roi(image, window.to_rect())?;
    Ok(region.try_clone()?)
}
