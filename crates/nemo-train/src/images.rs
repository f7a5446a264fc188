//! Image decoding and augmentation into CHW float buffers

use crate::config::AugmentConfig;
use image::imageops::FilterType;
use nemo_core::NemoError;
use rand::Rng;
use std::path::Path;

/// Square RGB image as channel-major `f32` values in `[0, 1]`
#[derive(Debug, Clone, PartialEq)]
pub struct ImageTensor {
    pub data: Vec<f32>,
    pub size: usize,
}

impl ImageTensor {
    pub fn new(data: Vec<f32>, size: usize) -> Self {
        debug_assert_eq!(data.len(), 3 * size * size);
        Self { data, size }
    }

    fn index(&self, channel: usize, y: usize, x: usize) -> usize {
        (channel * self.size + y) * self.size + x
    }

    pub fn get(&self, channel: usize, y: usize, x: usize) -> f32 {
        self.data[self.index(channel, y, x)]
    }

    // New image whose pixel (y, x) comes from `source(y, x)` of self
    fn remap<F>(&self, source: F) -> Self
    where
        F: Fn(usize, usize) -> (usize, usize),
    {
        let mut data = Vec::with_capacity(self.data.len());
        for channel in 0..3 {
            for y in 0..self.size {
                for x in 0..self.size {
                    let (sy, sx) = source(y, x);
                    data.push(self.get(channel, sy, sx));
                }
            }
        }
        Self::new(data, self.size)
    }

    pub fn flip_horizontal(&self) -> Self {
        let last = self.size - 1;
        self.remap(|y, x| (y, last - x))
    }

    pub fn flip_vertical(&self) -> Self {
        let last = self.size - 1;
        self.remap(|y, x| (last - y, x))
    }

    /// Rotate 90 degrees counter-clockwise
    pub fn rotate90(&self) -> Self {
        let last = self.size - 1;
        self.remap(|y, x| (x, last - y))
    }

    /// Add `delta` to every value, clamped to `[0, 1]`
    pub fn adjust_brightness(mut self, delta: f32) -> Self {
        for value in &mut self.data {
            *value = (*value + delta).clamp(0.0, 1.0);
        }
        self
    }
}

/// Decode `path`, resize to `size` x `size` and scale to `[0, 1]`
pub fn load_and_preprocess(path: &Path, size: usize) -> nemo_core::Result<ImageTensor> {
    let decoded = image::open(path).map_err(|e| NemoError::Decode {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    let mut rgb = decoded.to_rgb8();

    let side = size as u32;
    if rgb.dimensions() != (side, side) {
        rgb = image::imageops::resize(&rgb, side, side, FilterType::Triangle);
    }

    let mut data = Vec::with_capacity(3 * size * size);
    for channel in 0..3 {
        for y in 0..side {
            for x in 0..side {
                data.push(rgb.get_pixel(x, y)[channel] as f32 / 255.0);
            }
        }
    }

    Ok(ImageTensor::new(data, size))
}

/// Random flips, quarter turns and brightness shift
pub fn augment<R: Rng>(image: ImageTensor, config: &AugmentConfig, rng: &mut R) -> ImageTensor {
    let mut image = image;

    if config.flip_horizontal && rng.gen_bool(0.5) {
        image = image.flip_horizontal();
    }
    if config.flip_vertical && rng.gen_bool(0.5) {
        image = image.flip_vertical();
    }
    if config.rotate {
        for _ in 0..rng.gen_range(0..4) {
            image = image.rotate90();
        }
    }
    if config.max_brightness_delta > 0.0 {
        let delta = rng.gen_range(-config.max_brightness_delta..=config.max_brightness_delta);
        image = image.adjust_brightness(delta);
    }

    image
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    // 2x2 image whose red channel numbers the pixels 0..4 row-major
    fn numbered() -> ImageTensor {
        let mut data = vec![0.0; 12];
        data[..4].copy_from_slice(&[0.0, 0.1, 0.2, 0.3]);
        ImageTensor::new(data, 2)
    }

    fn red(image: &ImageTensor) -> Vec<f32> {
        image.data[..4].to_vec()
    }

    #[test]
    fn test_flips() {
        assert_eq!(red(&numbered().flip_horizontal()), vec![0.1, 0.0, 0.3, 0.2]);
        assert_eq!(red(&numbered().flip_vertical()), vec![0.2, 0.3, 0.0, 0.1]);
    }

    #[test]
    fn test_rotate90() {
        // Counter-clockwise: top-right moves to top-left
        assert_eq!(red(&numbered().rotate90()), vec![0.1, 0.3, 0.0, 0.2]);

        let mut image = numbered();
        for _ in 0..4 {
            image = image.rotate90();
        }
        assert_eq!(image, numbered());
    }

    #[test]
    fn test_brightness_is_clamped() {
        let image = ImageTensor::new(vec![0.95; 12], 2).adjust_brightness(0.1);
        assert!(image.data.iter().all(|&v| v == 1.0));
    }

    #[test]
    fn test_augment_keeps_values_in_range() {
        let mut rng = StdRng::seed_from_u64(1);
        let config = AugmentConfig::default();
        for _ in 0..20 {
            let image = augment(numbered(), &config, &mut rng);
            assert_eq!(image.data.len(), 12);
            assert!(image.data.iter().all(|v| (0.0..=1.0).contains(v)));
        }
    }

    #[test]
    fn test_load_and_preprocess_resizes() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("patch.png");
        image::RgbImage::from_pixel(40, 20, image::Rgb([255, 0, 51])).save(&path)?;

        let tensor = load_and_preprocess(&path, 32)?;
        assert_eq!(tensor.size, 32);
        assert_eq!(tensor.data.len(), 3 * 32 * 32);
        assert_eq!(tensor.get(0, 5, 5), 1.0);
        assert_eq!(tensor.get(1, 5, 5), 0.0);
        assert!((tensor.get(2, 5, 5) - 0.2).abs() < 1e-6);
        Ok(())
    }

    #[test]
    fn test_load_garbage_is_decode_error() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("broken.png");
        std::fs::write(&path, b"nope")?;

        assert!(matches!(
            load_and_preprocess(&path, 32),
            Err(NemoError::Decode { .. })
        ));
        Ok(())
    }
}
