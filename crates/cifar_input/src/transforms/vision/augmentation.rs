use crate::dataloader::worker_gen_bool;
use crate::transforms::Transform;
use anyhow::{ensure, Result};
use tch::Tensor;

// ============================================================================
// RandomHorizontalFlip
// ============================================================================

/// Randomly mirrors channel-last images (`[..., H, W, C]`) along the width axis.
///
/// # Example
/// ```ignore
/// let flip = RandomHorizontalFlip::new(0.5)?; // 50% flip chance
/// let augmented = flip.apply(image)?;
/// ```
#[derive(Debug, Clone)]
pub struct RandomHorizontalFlip {
    p: f64,
}

impl RandomHorizontalFlip {
    pub fn new(p: f64) -> Result<Self> {
        ensure!(
            (0.0..=1.0).contains(&p),
            "Probability must be in [0.0, 1.0] range (got {})",
            p
        );
        Ok(Self { p })
    }

    fn flip(image: Tensor) -> Result<Tensor> {
        let rank = image.dim();
        ensure!(
            rank >= 3,
            "Input must be at least a 3D [H, W, C] tensor (got shape {:?})",
            image.size()
        );
        Ok(image.flip([(rank - 2) as i64]))
    }
}

impl Transform<Tensor, Tensor> for RandomHorizontalFlip {
    fn apply(&self, image: Tensor) -> Result<Tensor> {
        match self.p {
            // Fast path: never flip
            p if p == 0.0 => Ok(image),
            // Fast path: always flip
            p if p == 1.0 => Self::flip(image),
            p => {
                if worker_gen_bool(p) {
                    Self::flip(image)
                } else {
                    Ok(image)
                }
            }
        }
    }
}
