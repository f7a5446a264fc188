//! Image I/O and small Mat helpers

use crate::Result;
use anyhow::{Context, ensure};
use nemo_core::NemoError;
use opencv::{
    core::{self, Mat, Scalar, CV_8UC1, CV_8UC3},
    imgcodecs::{self, IMREAD_COLOR},
    prelude::*,
};
use std::path::Path;

/// Image utility functions over OpenCV Mats
pub struct ImageUtils;

impl ImageUtils {
    /// Load an image as a 3-channel BGR Mat
    pub fn load_color<P: AsRef<Path>>(path: P) -> Result<Mat> {
        let path = path.as_ref();
        let path_str = path.to_string_lossy();

        let mat = imgcodecs::imread(&path_str, IMREAD_COLOR)
            .with_context(|| format!("Failed to load color image: {}", path_str))?;

        // imread signals an undecodable file with an empty Mat
        if mat.empty() {
            return Err(NemoError::Decode {
                path: path.to_path_buf(),
                reason: "unsupported or corrupt image data".to_string(),
            }
            .into());
        }

        Ok(mat)
    }

    /// Save Mat as image; the format follows the file extension
    pub fn save_image<P: AsRef<Path>>(mat: &Mat, path: P) -> Result<()> {
        let path_str = path.as_ref().to_string_lossy();

        let written = imgcodecs::imwrite(&path_str, mat, &core::Vector::new())
            .with_context(|| format!("Failed to save image: {}", path_str))?;
        ensure!(written, "Encoder refused to write image: {}", path_str);

        Ok(())
    }

    /// Single-channel 8-bit Mat from row-major pixel data
    pub fn gray_from_slice(rows: i32, cols: i32, pixels: &[u8]) -> Result<Mat> {
        ensure!(
            pixels.len() == (rows * cols) as usize,
            "Expected {} pixels, got {}",
            rows * cols,
            pixels.len()
        );

        let mut mat = Mat::new_rows_cols_with_default(rows, cols, CV_8UC1, Scalar::all(0.0))?;
        mat.data_typed_mut::<u8>()?.copy_from_slice(pixels);
        Ok(mat)
    }

    /// 3-channel 8-bit Mat filled with one BGR colour
    pub fn solid_color(rows: i32, cols: i32, bgr: (u8, u8, u8)) -> Result<Mat> {
        let fill = Scalar::new(bgr.0 as f64, bgr.1 as f64, bgr.2 as f64, 0.0);
        Ok(Mat::new_rows_cols_with_default(rows, cols, CV_8UC3, fill)?)
    }
}
