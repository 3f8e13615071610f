use crate::collator::Collator;
use crate::example::Example;
use anyhow::Result;
use tch::{Device, Tensor};

/// The `Batch` struct holds examples stacked along the batch dimension (dim 0).
///
/// # Shapes
/// With `B` examples of `[32, 32, 3]` images:
/// - plain: `images` -> `[B, 32, 32, 3]`, `labels` -> `[B]` or `[B, num_classes]`
/// - with `aug_count` random-augment copies: `images` -> `[B, aug_count, 32, 32, 3]`
/// - with AugMix: `images` -> `[B, aug_count + 1, 32, 32, 3]`
///
/// Adaptive mixup reshapes both tensors so that the leading dimension becomes
/// `ensemble_size * B` (or `(aug_count + 1) * B`).
#[derive(Debug)]
pub struct Batch {
    pub images: Tensor,
    pub labels: Tensor,
}

impl Batch {
    /// Constructs a `Batch` by applying the given [`Collator`] to a list of
    /// [`Example`]s.
    pub fn collate(examples: Vec<Example>, collator: &impl Collator) -> Result<Self> {
        collator.collate(&examples)
    }

    /// Number of rows along the leading dimension of `images`.
    pub fn batch_size(&self) -> i64 {
        self.images.size()[0]
    }

    /// Transfers both tensors to the target device (CPU/GPU)
    pub fn to_device(&self, device: Device) -> Self {
        Self {
            images: self.images.to_device(device),
            labels: self.labels.to_device(device),
        }
    }
}
