use crate::transforms::Transform;
use anyhow::{ensure, Result};
use image::{DynamicImage, GenericImageView};
use tch::Tensor;

// ============================================================================
// ImageToTensor
// ============================================================================

/// Converts a decoded image into a channel-last `Uint8` tensor `[H, W, 3]`,
/// the layout every catalog hands to the pipeline.
///
/// Grayscale, RGBA and other formats go through an RGB conversion first.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageToTensor;

impl Transform<DynamicImage, Tensor> for ImageToTensor {
    fn apply(&self, img: DynamicImage) -> Result<Tensor> {
        let (width, height) = img.dimensions();
        ensure!(
            width > 0 && height > 0,
            "Image dimensions must be positive (got {}x{})",
            width,
            height
        );

        let rgb = match img {
            DynamicImage::ImageRgb8(rgb) => rgb,
            other => other.to_rgb8(),
        };
        Ok(Tensor::from_slice(rgb.as_raw()).reshape([height as i64, width as i64, 3]))
    }
}
