//! Decodes raw upload bytes into the normalized RGB tensor the network
//! expects: `(1, target, target, 3)` with values in [0, 1].

use fast_image_resize::images::Image;
use fast_image_resize::{FilterType, PixelType, ResizeAlg, ResizeOptions, Resizer};
use ndarray::Array4;
use thiserror::Error;

/// Fixed resize target the network was trained against.
pub const DEFAULT_INPUT_SIZE: u32 = 224;

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("could not decode image: {0}")]
    InvalidImage(#[from] image::ImageError),

    #[error("resize failed: {0}")]
    Resize(String),
}

/// A decoded, resized and normalized scan, plus the dimensions of the
/// original decoded image for reporting back to the caller.
#[derive(Debug)]
pub struct PreparedScan {
    pub tensor: Array4<f32>,
    pub width: u32,
    pub height: u32,
}

pub struct ImagePreprocessor {
    target: u32,
}

impl ImagePreprocessor {
    pub fn new(target: u32) -> Self {
        Self { target }
    }

    /// Decode `bytes`, convert to RGB, resize to the square target, scale
    /// pixel values to [0, 1] and add the leading batch dimension.
    ///
    /// Resampling is bilinear. That choice is part of the numeric contract:
    /// a different filter shifts the probabilities the network produces.
    /// The conversion to RGB is explicit because decoders hand back their
    /// native channel order and the network was trained on RGB.
    pub fn prepare(&self, bytes: &[u8]) -> Result<PreparedScan, DecodeError> {
        let decoded = image::load_from_memory(bytes)?;
        let rgb = decoded.to_rgb8();
        let (width, height) = rgb.dimensions();

        tracing::trace!(width, height, "Decoded upload");

        let pixels = if width == self.target && height == self.target {
            rgb.into_raw()
        } else {
            self.resize(rgb)?
        };

        let target = self.target as usize;
        let scaled: Vec<f32> = pixels.iter().map(|&p| f32::from(p) / 255.0).collect();
        let tensor = Array4::from_shape_vec((1, target, target, 3), scaled)
            .map_err(|e| DecodeError::Resize(e.to_string()))?;

        Ok(PreparedScan {
            tensor,
            width,
            height,
        })
    }

    fn resize(&self, rgb: image::RgbImage) -> Result<Vec<u8>, DecodeError> {
        let (width, height) = rgb.dimensions();
        let mut pixels = rgb.into_raw();
        let src = Image::from_slice_u8(width, height, &mut pixels, PixelType::U8x3)
            .map_err(|e| DecodeError::Resize(e.to_string()))?;
        let mut dst = Image::new(self.target, self.target, PixelType::U8x3);

        Resizer::new()
            .resize(
                &src,
                &mut dst,
                &ResizeOptions::new().resize_alg(ResizeAlg::Convolution(FilterType::Bilinear)),
            )
            .map_err(|e| DecodeError::Resize(e.to_string()))?;

        Ok(dst.buffer().to_vec())
    }
}

impl Default for ImagePreprocessor {
    fn default() -> Self {
        Self::new(DEFAULT_INPUT_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn encode_png(width: u32, height: u32, pixel: [u8; 3]) -> Vec<u8> {
        let img = image::RgbImage::from_pixel(width, height, image::Rgb(pixel));
        let mut bytes = Cursor::new(Vec::new());
        img.write_to(&mut bytes, image::ImageFormat::Png).unwrap();
        bytes.into_inner()
    }

    #[test]
    fn prepares_a_normalized_batch_tensor() {
        let png = encode_png(64, 48, [255, 0, 0]);
        let scan = ImagePreprocessor::default().prepare(&png).unwrap();

        assert_eq!(scan.tensor.dim(), (1, 224, 224, 3));
        assert_eq!(scan.width, 64);
        assert_eq!(scan.height, 48);

        // A uniformly red image stays uniformly red through the resize.
        assert_eq!(scan.tensor[[0, 100, 100, 0]], 1.0);
        assert_eq!(scan.tensor[[0, 100, 100, 1]], 0.0);
        assert_eq!(scan.tensor[[0, 100, 100, 2]], 0.0);
    }

    #[test]
    fn values_stay_in_unit_range() {
        let png = encode_png(32, 32, [17, 128, 250]);
        let scan = ImagePreprocessor::default().prepare(&png).unwrap();
        assert!(scan.tensor.iter().all(|&v| (0.0..=1.0).contains(&v)));
    }

    #[test]
    fn an_image_already_at_target_size_skips_the_resize() {
        let png = encode_png(224, 224, [10, 20, 30]);
        let scan = ImagePreprocessor::default().prepare(&png).unwrap();

        assert_eq!(scan.tensor[[0, 0, 0, 0]], 10.0 / 255.0);
        assert_eq!(scan.tensor[[0, 223, 223, 1]], 20.0 / 255.0);
        assert_eq!(scan.tensor[[0, 111, 57, 2]], 30.0 / 255.0);
    }

    #[test]
    fn garbage_bytes_are_a_decode_error() {
        let result = ImagePreprocessor::default().prepare(b"not an image at all");
        assert!(matches!(result, Err(DecodeError::InvalidImage(_))));
    }

    #[test]
    fn small_targets_are_supported() {
        let png = encode_png(100, 100, [0, 255, 0]);
        let scan = ImagePreprocessor::new(8).prepare(&png).unwrap();
        assert_eq!(scan.tensor.dim(), (1, 8, 8, 3));
        assert_eq!(scan.tensor[[0, 4, 4, 1]], 1.0);
    }
}
