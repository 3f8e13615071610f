//! src/augment/mod.rs
//!
//! Augmentation beyond the basic crop/flip geometry.
//!
//! ```text
//! augment/
//! ├── mod.rs          → `Augmenter` capability trait
//! ├── randaugment.rs  → RandAugment: random chains of photometric/geometric ops
//! ├── augmix.rs       → AugMix: convex blends of augmented chains
//! └── mixup.rs        → Batch-level mixup (fixed alpha and adaptive)
//! ```

pub mod augmix;
pub mod mixup;
pub mod randaugment;

use anyhow::Result;
use std::sync::Arc;
use tch::Tensor;

pub use augmix::{augment_and_mix, AugMix};
pub use mixup::{adaptive_mixup, mixup, BatchMixup};
pub use randaugment::{AugmentOp, RandAugment};

/// A single-image randomized transform.
///
/// `distort` takes a `Uint8` channel-last image `[H, W, C]` and returns a new
/// randomly perturbed image of the same shape and kind. Implementations draw
/// their randomness from the worker RNG so seeded pipelines stay reproducible.
pub trait Augmenter: Send + Sync {
    fn distort(&self, image: &Tensor) -> Result<Tensor>;
}

impl std::fmt::Debug for dyn Augmenter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("dyn Augmenter")
    }
}

impl<A: Augmenter + ?Sized> Augmenter for Arc<A> {
    fn distort(&self, image: &Tensor) -> Result<Tensor> {
        (**self).distort(image)
    }
}

impl<A: Augmenter + ?Sized> Augmenter for Box<A> {
    fn distort(&self, image: &Tensor) -> Result<Tensor> {
        (**self).distort(image)
    }
}
