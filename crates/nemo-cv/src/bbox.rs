//! Bounding boxes of connected components
//!
//! Thin wrapper over the per-label statistics OpenCV reports, with the
//! conversions the drawing and cropping code needs.

use opencv::core::{Point, Rect, Scalar};
use serde::{Deserialize, Serialize};

/// Axis-aligned box around a component, in pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BBox {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl BBox {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Convert to OpenCV Rect
    pub fn to_rect(&self) -> Rect {
        Rect::new(self.x, self.y, self.width, self.height)
    }

    /// Top-left corner
    pub fn top_left(&self) -> Point {
        Point::new(self.x, self.y)
    }

    /// Corner one past the last covered pixel
    pub fn bottom_right(&self) -> Point {
        Point::new(self.x + self.width, self.y + self.height)
    }

    /// Check whether the box lies inside a `width` x `height` image
    pub fn fits_within(&self, width: i32, height: i32) -> bool {
        self.x >= 0 && self.y >= 0 && self.x + self.width <= width && self.y + self.height <= height
    }
}

/// OpenCV colour scalar (BGR order) from an RGB triple
pub fn bgr_scalar(rgb: (u8, u8, u8)) -> Scalar {
    Scalar::new(rgb.2 as f64, rgb.1 as f64, rgb.0 as f64, 255.0)
}
