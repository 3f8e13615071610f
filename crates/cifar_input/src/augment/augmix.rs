//! AugMix: mix several chains of augmentations, then mix the result with the
//! clean image.
//!
//! ```text
//! mix_weight     ~ Beta(p, p)
//! branch_weights ~ Dirichlet(p, ..., p)            (width entries)
//! mix            = Σ_i branch_weights[i] * normalize(distort^depth[i](image))
//! output         = mix_weight * mix + (1 - mix_weight) * normalize(image)
//! ```
//!
//! Both levels are convex combinations, so every output pixel stays inside
//! the envelope of the normalized branches and the normalized clean image.

use super::Augmenter;
use crate::config::AugmentationConfig;
use crate::dataloader::{with_worker_rng, worker_gen_range};
use crate::precision::Precision;
use crate::transforms::vision::normalize_convert_image;
use crate::transforms::Transform;
use anyhow::{anyhow, ensure, Context, Result};
use rand_distr::{Beta, Distribution, Gamma};
use std::sync::Arc;
use tch::Tensor;

/// Random per-branch depths are drawn from `1..MAX_RANDOM_DEPTH`.
const MAX_RANDOM_DEPTH: usize = 4;

/// Draws the clean-vs-mixed weight from `Beta(prob_coeff, prob_coeff)`.
pub fn sample_mix_weight(prob_coeff: f64) -> Result<f64> {
    let beta = Beta::new(prob_coeff, prob_coeff)
        .map_err(|e| anyhow!("Invalid Beta({0}, {0}) parameters: {1}", prob_coeff, e))?;
    Ok(with_worker_rng(|rng| beta.sample(rng)))
}

/// Draws `width` branch weights from a symmetric Dirichlet with concentration
/// `prob_coeff`. A single branch always gets weight 1.
pub fn sample_branch_weights(width: usize, prob_coeff: f64) -> Result<Vec<f64>> {
    ensure!(width > 0, "AugMix width must be at least 1");
    if width == 1 {
        return Ok(vec![1.0]);
    }

    let gamma = Gamma::new(prob_coeff, 1.0)
        .map_err(|e| anyhow!("Invalid Dirichlet concentration {}: {}", prob_coeff, e))?;
    let draws: Vec<f64> = with_worker_rng(|rng| (0..width).map(|_| gamma.sample(rng)).collect());

    let total: f64 = draws.iter().sum();
    if total > 0.0 && total.is_finite() {
        Ok(draws.into_iter().map(|d| d / total).collect())
    } else {
        // Every gamma draw underflowed; fall back to the Dirichlet mean.
        Ok(vec![1.0 / width as f64; width])
    }
}

/// Resolves the chain length of every branch: a negative `depth` draws each
/// branch uniformly from `[1, 4)`, otherwise every branch uses `depth`.
pub fn resolve_branch_depths(depth: i64, width: usize) -> Vec<usize> {
    if depth < 0 {
        (0..width)
            .map(|_| worker_gen_range(1..MAX_RANDOM_DEPTH))
            .collect()
    } else {
        vec![depth as usize; width]
    }
}

/// Applies a mixture of augmentation chains to a single `Uint8` image
/// `[H, W, C]` and returns a normalized image in `precision`.
pub fn augment_and_mix(
    image: &Tensor,
    depth: i64,
    width: usize,
    prob_coeff: f64,
    augmenter: &dyn Augmenter,
    precision: Precision,
) -> Result<Tensor> {
    let mix_weight = sample_mix_weight(prob_coeff)?;
    let branch_weights = sample_branch_weights(width, prob_coeff)?;
    let depths = resolve_branch_depths(depth, width);

    let clean = normalize_convert_image(image, precision)?;
    let mut mix = clean.zeros_like();
    for (branch, (&weight, &branch_depth)) in branch_weights.iter().zip(&depths).enumerate() {
        let mut branch_img = image.shallow_clone();
        for _ in 0..branch_depth {
            branch_img = augmenter
                .distort(&branch_img)
                .with_context(|| format!("Augmenter failed in AugMix branch {}", branch))?;
        }
        mix += normalize_convert_image(&branch_img, precision)? * weight;
    }

    Ok(mix * mix_weight + clean * (1.0 - mix_weight))
}

// ============================================================================
// AugMix
// ============================================================================

/// Per-example AugMix stack: the normalized clean image followed by `count`
/// independent [`augment_and_mix`] variants, `[count + 1, H, W, C]`.
#[derive(Clone)]
pub struct AugMix {
    depth: i64,
    width: usize,
    prob_coeff: f64,
    count: usize,
    precision: Precision,
    augmenter: Arc<dyn Augmenter>,
}

impl std::fmt::Debug for AugMix {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AugMix")
            .field("depth", &self.depth)
            .field("width", &self.width)
            .field("prob_coeff", &self.prob_coeff)
            .field("count", &self.count)
            .field("precision", &self.precision)
            .finish_non_exhaustive()
    }
}

impl AugMix {
    pub fn new(
        depth: i64,
        width: usize,
        prob_coeff: f64,
        count: usize,
        precision: Precision,
        augmenter: Arc<dyn Augmenter>,
    ) -> Result<Self> {
        ensure!(width > 0, "AugMix width must be at least 1");
        ensure!(count > 0, "AugMix count must be at least 1");
        ensure!(
            prob_coeff > 0.0,
            "AugMix prob_coeff must be positive (got {})",
            prob_coeff
        );
        Ok(Self {
            depth,
            width,
            prob_coeff,
            count,
            precision,
            augmenter,
        })
    }

    /// Reads `augmix_depth`, `augmix_width`, `augmix_prob_coeff` and `aug_count`.
    pub fn from_config(
        config: &AugmentationConfig,
        precision: Precision,
        augmenter: Arc<dyn Augmenter>,
    ) -> Result<Self> {
        Self::new(
            config.augmix_depth,
            config.augmix_width,
            config.augmix_prob_coeff,
            config.aug_count,
            precision,
            augmenter,
        )
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn mix(&self, image: &Tensor) -> Result<Tensor> {
        let mut stack = Vec::with_capacity(self.count + 1);
        stack.push(normalize_convert_image(image, self.precision)?);
        for _ in 0..self.count {
            stack.push(augment_and_mix(
                image,
                self.depth,
                self.width,
                self.prob_coeff,
                self.augmenter.as_ref(),
                self.precision,
            )?);
        }
        Ok(Tensor::stack(&stack, 0))
    }
}

impl Transform<Tensor, Tensor> for AugMix {
    fn apply(&self, image: Tensor) -> Result<Tensor> {
        self.mix(&image)
    }
}
