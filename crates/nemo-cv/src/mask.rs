//! Binary mask construction: grayscale -> median blur -> binary threshold

use crate::Result;
use anyhow::{Context, ensure};
use opencv::{
    core::Mat,
    imgproc::{self, COLOR_BGR2GRAY, THRESH_BINARY},
    prelude::*,
};

/// Value of foreground pixels in every mask
pub const FOREGROUND: u8 = 255;

/// Convert a BGR image to grayscale; single-channel input is copied as is
pub fn to_grayscale(image: &Mat) -> Result<Mat> {
    if image.channels() == 1 {
        return Ok(image.try_clone()?);
    }

    let mut gray = Mat::default();
    imgproc::cvt_color_def(image, &mut gray, COLOR_BGR2GRAY)
        .context("Grayscale conversion failed")?;
    Ok(gray)
}

/// Median blur with an odd kernel size
pub fn median_blur(image: &Mat, ksize: i32) -> Result<Mat> {
    ensure!(
        ksize > 1 && ksize % 2 == 1,
        "Median blur size must be odd and greater than 1, got {}",
        ksize
    );

    let mut blurred = Mat::default();
    imgproc::median_blur(image, &mut blurred, ksize).context("Median blur failed")?;
    Ok(blurred)
}

/// Binary mask of `image`: pixels brighter than `threshold` after blurring
/// become [`FOREGROUND`], everything else 0.
pub fn binary_mask(image: &Mat, blur_size: i32, threshold: u8) -> Result<Mat> {
    let gray = to_grayscale(image)?;
    let blurred = median_blur(&gray, blur_size)?;

    let mut binary = Mat::default();
    imgproc::threshold(
        &blurred,
        &mut binary,
        threshold as f64,
        FOREGROUND as f64,
        THRESH_BINARY,
    )
    .context("Binary threshold failed")?;

    Ok(binary)
}
