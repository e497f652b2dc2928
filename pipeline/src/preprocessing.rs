//! Image preprocessing: decode, grayscale, resize and normalize for submission

use crate::error::{PipelineError, Result};
use image::imageops::FilterType;
use image::{DynamicImage, GrayImage};
use ndarray::Array2;
use std::path::Path;

/// Default edge length images are resized to before submission
pub const DEFAULT_TARGET_SIZE: (u32, u32) = (128, 128);

/// Converts encoded images into the normalized 2D arrays the pipeline accepts
#[derive(Debug, Clone)]
pub struct ImageNormalizer {
    /// Target size (width, height)
    target_size: (u32, u32),
    filter: FilterType,
}

impl Default for ImageNormalizer {
    fn default() -> Self {
        Self::new(DEFAULT_TARGET_SIZE)
    }
}

impl ImageNormalizer {
    pub fn new(target_size: (u32, u32)) -> Self {
        Self {
            target_size,
            filter: FilterType::Lanczos3,
        }
    }

    /// Use a different resampling filter
    pub fn with_filter(mut self, filter: FilterType) -> Self {
        self.filter = filter;
        self
    }

    pub fn target_size(&self) -> (u32, u32) {
        self.target_size
    }

    /// Load and normalize an image file
    pub fn from_path<P: AsRef<Path>>(&self, path: P) -> Result<Array2<f64>> {
        let img = image::open(path)
            .map_err(|e| PipelineError::preprocessing(format!("Failed to load image: {}", e)))?;
        self.from_dynamic_image(&img)
    }

    /// Decode and normalize an encoded image (PNG, JPEG, BMP)
    pub fn from_bytes(&self, bytes: &[u8]) -> Result<Array2<f64>> {
        if bytes.is_empty() {
            return Err(PipelineError::preprocessing("No image data provided"));
        }
        let img = image::load_from_memory(bytes)?;
        self.from_dynamic_image(&img)
    }

    /// Grayscale, resize to the target size, scale into [0, 1].
    /// Rows of the result correspond to image height.
    pub fn from_dynamic_image(&self, img: &DynamicImage) -> Result<Array2<f64>> {
        let (width, height) = self.target_size;
        if width == 0 || height == 0 {
            return Err(PipelineError::preprocessing(format!(
                "Invalid target size {}x{}",
                width, height
            )));
        }

        let gray = img.to_luma8();
        let resized = if gray.dimensions() == self.target_size {
            gray
        } else {
            image::imageops::resize(&gray, width, height, self.filter)
        };

        Ok(Self::to_array(&resized))
    }

    fn to_array(gray: &GrayImage) -> Array2<f64> {
        let (width, height) = gray.dimensions();
        Array2::from_shape_fn((height as usize, width as usize), |(row, col)| {
            gray.get_pixel(col as u32, row as u32).0[0] as f64 / 255.0
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageOutputFormat, Luma, Rgb, RgbImage};
    use std::io::Cursor;

    fn encode_png(img: &DynamicImage) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, ImageOutputFormat::Png).unwrap();
        buf.into_inner()
    }

    #[test]
    fn test_normalizer_defaults() {
        let normalizer = ImageNormalizer::default();
        assert_eq!(normalizer.target_size(), (128, 128));
    }

    #[test]
    fn test_shape_is_rows_by_columns() {
        let normalizer = ImageNormalizer::new((6, 3)).with_filter(FilterType::Nearest);
        let img = DynamicImage::ImageLuma8(GrayImage::from_pixel(12, 6, Luma([255])));
        let array = normalizer.from_dynamic_image(&img).unwrap();
        assert_eq!(array.dim(), (3, 6));
        assert!(array.iter().all(|&v| (v - 1.0).abs() < 1e-12));
    }

    #[test]
    fn test_from_bytes_grayscale_and_scale() {
        let mut rgb = RgbImage::new(4, 4);
        for pixel in rgb.pixels_mut() {
            *pixel = Rgb([0, 0, 0]);
        }
        rgb.put_pixel(0, 0, Rgb([255, 255, 255]));
        let bytes = encode_png(&DynamicImage::ImageRgb8(rgb));

        let normalizer = ImageNormalizer::new((4, 4));
        let array = normalizer.from_bytes(&bytes).unwrap();
        assert_eq!(array.dim(), (4, 4));
        assert!((array[[0, 0]] - 1.0).abs() < 1e-12);
        assert_eq!(array[[3, 3]], 0.0);
    }

    #[test]
    fn test_rejects_garbage_bytes() {
        let normalizer = ImageNormalizer::default();
        assert!(matches!(
            normalizer.from_bytes(&[]),
            Err(PipelineError::Preprocessing(_))
        ));
        assert!(matches!(
            normalizer.from_bytes(b"not an image"),
            Err(PipelineError::Image(_))
        ));
    }
}
