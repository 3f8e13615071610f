use anyhow::{ensure, Result};
use tch::{Kind, Tensor};

/// The `Example` struct is a single `(image, label)` pair flowing through the pipeline.
///
/// - `image`: `[H, W, C]` tensor. Raw examples from a catalog are `Uint8`;
///   preprocessed ones are in the pipeline precision and may carry a leading
///   augmentation axis (`[A, H, W, C]`).
/// - `label`: `Int64` scalar class index for raw examples, then either a
///   scalar or a one-hot vector after encoding.
///
/// Examples are never mutated in place: each transform consumes one and
/// returns a new one.
#[derive(Debug)]
pub struct Example {
    pub image: Tensor,
    pub label: Tensor,
}

/// Creates a shallow clone of the `Example`
impl Clone for Example {
    fn clone(&self) -> Self {
        Self {
            image: self.image.shallow_clone(),
            label: self.label.shallow_clone(),
        }
    }
}

/// Safety:
/// `tch::Tensor` is `Send` and `Sync` in its source, and `Example` only
/// composes two tensors. Mutation requires ownership, so shared references
/// only ever read.
unsafe impl Send for Example {}
unsafe impl Sync for Example {}

impl Example {
    pub fn new(image: Tensor, label: Tensor) -> Self {
        Self { image, label }
    }

    /// Builds a raw example from an `Uint8` HWC image and a class index.
    pub fn raw(image: Tensor, class_index: i64) -> Result<Self> {
        ensure!(
            image.dim() == 3,
            "Raw images must be 3D [H, W, C] tensors (got shape {:?})",
            image.size()
        );
        ensure!(
            class_index >= 0,
            "Class index must be non-negative (got {})",
            class_index
        );
        Ok(Self {
            image: image.to_kind(Kind::Uint8),
            label: Tensor::from(class_index),
        })
    }

    /// Returns the class index of a raw (not yet encoded) label.
    pub fn class_index(&self) -> Result<i64> {
        ensure!(
            self.label.numel() == 1,
            "Label is already encoded (shape {:?})",
            self.label.size()
        );
        Ok(self.label.int64_value(&[]))
    }
}
