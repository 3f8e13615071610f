//! Batch-level mixup.
//!
//! A batch is mixed with itself in reverse order: row `i` is blended with row
//! `B - 1 - i`. Weights are folded to `max(w, 1 - w)` so every row stays
//! dominated by its own example.

use crate::batch::Batch;
use crate::config::{AugmentationConfig, MixupCoeff};
use crate::dataloader::with_worker_rng;
use crate::transforms::Transform;
use anyhow::{anyhow, ensure, Result};
use rand_distr::{Beta, Distribution};
use std::sync::Arc;
use tch::Tensor;

/// Folds a weight so the own example keeps the larger share.
fn fold(w: f64) -> f64 {
    w.max(1.0 - w)
}

/// Shapes a flat weight vector for broadcasting against `like`: the leading
/// `lead` dims keep their size, every other dim becomes 1.
fn broadcast_weights(weights: &[f64], lead: &[i64], like: &Tensor) -> Tensor {
    let mut shape = lead.to_vec();
    shape.resize(like.dim(), 1);
    Tensor::from_slice(weights).to_kind(like.kind()).view(shape.as_slice())
}

fn blend_with_reversed(values: &Tensor, weights: &Tensor) -> Tensor {
    values * weights + values.flip([0]) * (weights * -1.0 + 1.0)
}

fn check_batch(batch_size: usize, images: &Tensor, labels: &Tensor) -> Result<()> {
    let b = batch_size as i64;
    ensure!(
        images.size().first() == Some(&b) && labels.size().first() == Some(&b),
        "Mixup expects {} rows (got images {:?}, labels {:?})",
        batch_size,
        images.size(),
        labels.size()
    );
    ensure!(
        labels.dim() == 2,
        "Mixup needs one-hot labels [B, num_classes] (got {:?})",
        labels.size()
    );
    Ok(())
}

/// Mixup with a fixed `mixup_alpha`.
///
/// `images` is `[B, H, W, C]`, or `[B, aug_count + 1, H, W, C]` with AugMix,
/// in which case every copy draws its own weight and the labels come back as
/// `[(aug_count + 1) * B, num_classes]`, copy-major.
pub fn mixup(
    batch_size: usize,
    config: &AugmentationConfig,
    images: &Tensor,
    labels: &Tensor,
) -> Result<(Tensor, Tensor)> {
    check_batch(batch_size, images, labels)?;
    let alpha = config.mixup_alpha;
    let beta = Beta::new(alpha, alpha)
        .map_err(|e| anyhow!("Invalid mixup alpha {}: {}", alpha, e))?;

    let copies = if config.augmix { config.aug_count + 1 } else { 1 };
    if config.augmix {
        ensure!(
            images.dim() == 5 && images.size()[1] == copies as i64,
            "AugMix mixup expects images [B, {}, H, W, C] (got {:?})",
            copies,
            images.size()
        );
    }

    let weights: Vec<f64> = with_worker_rng(|rng| {
        (0..batch_size * copies)
            .map(|_| fold(beta.sample(rng)))
            .collect()
    });

    let b = batch_size as i64;
    if config.augmix {
        let c = copies as i64;
        let image_w = broadcast_weights(&weights, &[b, c], images);
        let mixed_images = blend_with_reversed(images, &image_w);

        let num_classes = labels.size()[1];
        let tiled = labels.unsqueeze(1).expand([b, c, num_classes], false);
        let label_w = broadcast_weights(&weights, &[b, c], &tiled);
        let mixed_labels = blend_with_reversed(&tiled, &label_w)
            .transpose(0, 1)
            .reshape([c * b, num_classes]);
        Ok((mixed_images, mixed_labels))
    } else {
        let image_w = broadcast_weights(&weights, &[b], images);
        let label_w = broadcast_weights(&weights, &[b], labels);
        Ok((
            blend_with_reversed(images, &image_w),
            blend_with_reversed(labels, &label_w),
        ))
    }
}

/// Mixup whose concentration depends on each example's class and ensemble
/// member: `alpha[e, i] = coeff[e, argmax(labels[i])]`.
///
/// Entries with `0 < alpha < 1` draw `Beta(alpha, alpha)`; any other entry is
/// used as the weight itself, clipped to `[0, 1]`. The batch is expanded to
/// `ensemble_size * B` rows: tiled for plain images, or with the AugMix copy
/// axis moved to the front (one copy per ensemble member).
pub fn adaptive_mixup(
    batch_size: usize,
    config: &AugmentationConfig,
    coeff: &MixupCoeff,
    images: &Tensor,
    labels: &Tensor,
) -> Result<(Tensor, Tensor)> {
    check_batch(batch_size, images, labels)?;
    let (ensemble_size, num_classes) = coeff.shape();
    ensure!(
        ensemble_size == config.ensemble_size && labels.size()[1] == num_classes as i64,
        "Mixup coefficients {:?} do not match ensemble_size {} and labels {:?}",
        coeff.shape(),
        config.ensemble_size,
        labels.size()
    );

    let classes: Vec<i64> = Vec::try_from(&labels.argmax(1, false).contiguous())?;
    let mut alphas = Vec::with_capacity(ensemble_size * batch_size);
    for member in 0..ensemble_size {
        for &class in &classes {
            let alpha = coeff
                .get(member, class as usize)
                .ok_or_else(|| anyhow!("Class {} outside mixup coefficients", class))?;
            alphas.push(alpha);
        }
    }

    let weights: Vec<f64> = with_worker_rng(|rng| {
        alphas
            .iter()
            .map(|&alpha| {
                let w = match Beta::new(alpha, alpha) {
                    Ok(beta) if alpha > 0.0 && alpha < 1.0 => beta.sample(rng),
                    _ => alpha,
                };
                fold(w.clamp(0.0, 1.0))
            })
            .collect()
    });

    let e = ensemble_size as i64;
    let rows = e * batch_size as i64;
    let expanded_images = if config.augmix {
        ensure!(
            images.dim() == 5 && images.size()[1] == e,
            "Adaptive AugMix mixup expects images [B, {}, H, W, C] (got {:?})",
            e,
            images.size()
        );
        let size = images.size();
        images
            .permute([1, 0, 2, 3, 4])
            .reshape([rows, size[2], size[3], size[4]])
    } else {
        let mut repeats = vec![1i64; images.dim()];
        repeats[0] = e;
        images.repeat(repeats.as_slice())
    };
    let expanded_labels = labels.repeat([e, 1]);

    let image_w = broadcast_weights(&weights, &[rows], &expanded_images);
    let label_w = broadcast_weights(&weights, &[rows], &expanded_labels);
    Ok((
        blend_with_reversed(&expanded_images, &image_w),
        blend_with_reversed(&expanded_labels, &label_w),
    ))
}

// ============================================================================
// BatchMixup
// ============================================================================

/// Batch-level mixup stage of a training pipeline.
#[derive(Debug, Clone)]
pub enum BatchMixup {
    Fixed {
        config: Arc<AugmentationConfig>,
    },
    Adaptive {
        config: Arc<AugmentationConfig>,
        coeff: MixupCoeff,
    },
}

impl BatchMixup {
    /// Returns `None` when `mixup_alpha` is 0. Adaptive mixup needs the
    /// coefficients resolved by [`AugmentationConfig::ensure_mixup_coeff`].
    pub fn from_config(
        config: Arc<AugmentationConfig>,
        coeff: Option<&MixupCoeff>,
    ) -> Result<Option<Self>> {
        if config.mixup_alpha <= 0.0 {
            return Ok(None);
        }
        if config.adaptive_mixup {
            let coeff = coeff
                .cloned()
                .ok_or_else(|| anyhow!("Adaptive mixup requires resolved mixup coefficients"))?;
            Ok(Some(Self::Adaptive { config, coeff }))
        } else {
            Ok(Some(Self::Fixed { config }))
        }
    }

    pub fn mix(&self, batch: &Batch) -> Result<Batch> {
        let batch_size = batch.labels.size().first().copied().unwrap_or(0) as usize;
        let labels = batch.labels.to_kind(batch.images.kind());
        let (images, labels) = match self {
            Self::Fixed { config } => mixup(batch_size, config, &batch.images, &labels)?,
            Self::Adaptive { config, coeff } => {
                adaptive_mixup(batch_size, config, coeff, &batch.images, &labels)?
            }
        };
        Ok(Batch { images, labels })
    }
}

impl Transform<Batch, Batch> for BatchMixup {
    fn apply(&self, batch: Batch) -> Result<Batch> {
        self.mix(&batch)
    }
}
