use crate::dataloader::worker_gen_range;
use crate::transforms::Transform;
use anyhow::{ensure, Result};
use tch::Tensor;

// ============================================================================
// PadAndRandomCrop
// ============================================================================

/// Zero-pads the spatial dimensions of a channel-last image and takes a random
/// crop back to the original size.
///
/// Input/output: `[..., H, W, C]`. Leading dimensions, if any, share the crop
/// window.
///
/// The crop offset is uniform over every valid position, i.e.
/// `0..=2 * padding` on both axes.
///
/// # Example
/// ```ignore
/// let crop = PadAndRandomCrop::new(4)?;
/// let cropped = crop.apply(image)?; // same shape as `image`
/// ```
#[derive(Debug, Clone)]
pub struct PadAndRandomCrop {
    padding: i64,
}

impl PadAndRandomCrop {
    pub fn new(padding: i64) -> Result<Self> {
        ensure!(
            padding >= 0,
            "Crop padding must be non-negative (got {})",
            padding
        );
        Ok(Self { padding })
    }

    pub fn padding(&self) -> i64 {
        self.padding
    }
}

impl Transform<Tensor, Tensor> for PadAndRandomCrop {
    fn apply(&self, image: Tensor) -> Result<Tensor> {
        let shape = image.size();
        ensure!(
            shape.len() >= 3,
            "Input must be at least a 3D [H, W, C] tensor (got shape {:?})",
            shape
        );
        if self.padding == 0 {
            return Ok(image);
        }

        let rank = shape.len();
        let (height, width) = (shape[rank - 3], shape[rank - 2]);
        let pad = self.padding;

        // constant_pad_nd pairs run from the last dimension backwards: C, W, H.
        let padded = image.constant_pad_nd([0, 0, pad, pad, pad, pad]);

        let top = worker_gen_range(0..2 * pad + 1);
        let left = worker_gen_range(0..2 * pad + 1);

        Ok(padded
            .narrow((rank - 3) as i64, top, height)
            .narrow((rank - 2) as i64, left, width))
    }
}
