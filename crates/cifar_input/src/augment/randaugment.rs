//! RandAugment on channel-last `Uint8` tensors.
//!
//! Each call to `distort` applies `num_layers` operations chosen uniformly
//! from the op list plus an identity slot. Every op runs at the same global
//! `magnitude` (0..=10); ops with a direction (rotate, shear, translate) pick
//! the sign at random.

use super::Augmenter;
use crate::dataloader::{worker_gen_bool, worker_gen_range};
use anyhow::{ensure, Context, Result};
use tch::{Kind, Tensor};

const MAX_LEVEL: f64 = 10.0;
/// Fill value for pixels uncovered by geometric ops and cutout.
const REPLACE_VALUE: f64 = 128.0;

/// The operations RandAugment samples from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AugmentOp {
    AutoContrast,
    Equalize,
    Invert,
    Rotate,
    Posterize,
    Solarize,
    Color,
    Contrast,
    Brightness,
    Sharpness,
    ShearX,
    ShearY,
    TranslateX,
    TranslateY,
    Cutout,
    SolarizeAdd,
}

impl AugmentOp {
    pub const ALL: [AugmentOp; 16] = [
        AugmentOp::AutoContrast,
        AugmentOp::Equalize,
        AugmentOp::Invert,
        AugmentOp::Rotate,
        AugmentOp::Posterize,
        AugmentOp::Solarize,
        AugmentOp::Color,
        AugmentOp::Contrast,
        AugmentOp::Brightness,
        AugmentOp::Sharpness,
        AugmentOp::ShearX,
        AugmentOp::ShearY,
        AugmentOp::TranslateX,
        AugmentOp::TranslateY,
        AugmentOp::Cutout,
        AugmentOp::SolarizeAdd,
    ];

    /// Applies the op to a float image `[H, W, C]` with values in `[0, 255]`.
    fn apply(self, img: &Tensor, level: f64, params: &RandAugment) -> Result<Tensor> {
        let fraction = level / MAX_LEVEL;
        let enhance_factor = fraction * 1.8 + 0.1;

        Ok(match self {
            AugmentOp::AutoContrast => autocontrast(img)?,
            AugmentOp::Equalize => equalize(img)?,
            AugmentOp::Invert => img * -1.0 + 255.0,
            AugmentOp::Rotate => rotate(img, random_sign(fraction * 30.0).to_radians())?,
            AugmentOp::Posterize => posterize(img, (fraction * 4.0) as u32),
            AugmentOp::Solarize => solarize(img, (fraction * 256.0).trunc()),
            AugmentOp::SolarizeAdd => solarize_add(img, (fraction * 110.0).trunc(), 128.0),
            AugmentOp::Color => blend(&grayscale(img).repeat([1, 1, 3]), img, enhance_factor),
            AugmentOp::Contrast => {
                let mean = grayscale(img).round().mean(Kind::Float).double_value(&[]);
                blend(&(img.ones_like() * mean), img, enhance_factor)
            }
            AugmentOp::Brightness => blend(&img.zeros_like(), img, enhance_factor),
            AugmentOp::Sharpness => blend(&smooth(img)?, img, enhance_factor),
            AugmentOp::ShearX => {
                let shear = random_sign(fraction * 0.3);
                warp_affine(img, [1.0, shear, 0.0, 0.0, 1.0, 0.0])?
            }
            AugmentOp::ShearY => {
                let shear = random_sign(fraction * 0.3);
                warp_affine(img, [1.0, 0.0, 0.0, shear, 1.0, 0.0])?
            }
            AugmentOp::TranslateX => {
                let pixels = random_sign(fraction * params.translate_const);
                warp_affine(img, [1.0, 0.0, -pixels, 0.0, 1.0, 0.0])?
            }
            AugmentOp::TranslateY => {
                let pixels = random_sign(fraction * params.translate_const);
                warp_affine(img, [1.0, 0.0, 0.0, 0.0, 1.0, -pixels])?
            }
            AugmentOp::Cutout => cutout(img, (fraction * params.cutout_const) as i64)?,
        })
    }
}

/// RandAugment with a fixed number of layers and a global magnitude.
///
/// The default constants are sized for 32x32 images: translations of up to
/// 10 pixels and cutout squares of up to 16x16.
///
/// # Example
/// ```ignore
/// let augmenter = RandAugment::default();
/// let distorted = augmenter.distort(&image)?; // Uint8 [32, 32, 3]
/// ```
#[derive(Debug, Clone)]
pub struct RandAugment {
    num_layers: usize,
    magnitude: f64,
    cutout_const: f64,
    translate_const: f64,
    ops: Vec<AugmentOp>,
}

impl Default for RandAugment {
    fn default() -> Self {
        Self {
            num_layers: 2,
            magnitude: 10.0,
            cutout_const: 8.0,
            translate_const: 10.0,
            ops: AugmentOp::ALL.to_vec(),
        }
    }
}

impl RandAugment {
    pub fn new(num_layers: usize, magnitude: f64) -> Result<Self> {
        ensure!(
            (0.0..=MAX_LEVEL).contains(&magnitude),
            "RandAugment magnitude must be in [0, {}] (got {})",
            MAX_LEVEL,
            magnitude
        );
        Ok(Self {
            num_layers,
            magnitude,
            ..Self::default()
        })
    }

    /// Maximum cutout half-size in pixels at full magnitude.
    pub fn with_cutout_const(mut self, cutout_const: f64) -> Self {
        self.cutout_const = cutout_const;
        self
    }

    /// Maximum translation in pixels at full magnitude.
    pub fn with_translate_const(mut self, translate_const: f64) -> Self {
        self.translate_const = translate_const;
        self
    }

    /// Restricts sampling to the given ops.
    pub fn with_ops(mut self, ops: &[AugmentOp]) -> Result<Self> {
        ensure!(!ops.is_empty(), "RandAugment needs at least one op");
        self.ops = ops.to_vec();
        Ok(self)
    }

    pub fn num_layers(&self) -> usize {
        self.num_layers
    }

    /// Applies one specific op at this augmenter's magnitude.
    pub fn apply_op(&self, op: AugmentOp, image: &Tensor) -> Result<Tensor> {
        let img = to_float_image(image)?;
        let out = op
            .apply(&img, self.magnitude, self)
            .with_context(|| format!("RandAugment op {:?} failed", op))?;
        Ok(to_uint8(&out))
    }
}

impl Augmenter for RandAugment {
    fn distort(&self, image: &Tensor) -> Result<Tensor> {
        let mut img = to_float_image(image)?;
        for _ in 0..self.num_layers {
            // The extra slot is the identity op.
            let choice = worker_gen_range(0..self.ops.len() + 1);
            if let Some(&op) = self.ops.get(choice) {
                img = op
                    .apply(&img, self.magnitude, self)
                    .with_context(|| format!("RandAugment op {:?} failed", op))?;
            }
        }
        Ok(to_uint8(&img))
    }
}

// ============================================================================
// Ops on float images in [0, 255]
// ============================================================================

fn to_float_image(image: &Tensor) -> Result<Tensor> {
    ensure!(
        image.kind() == Kind::Uint8,
        "RandAugment expects Uint8 images (got {:?})",
        image.kind()
    );
    let (_h, _w, c) = image
        .size3()
        .context("RandAugment expects a 3D [H, W, C] image")?;
    ensure!(c == 3, "RandAugment expects 3 channels (got {})", c);
    Ok(image.to_kind(Kind::Float))
}

fn to_uint8(img: &Tensor) -> Tensor {
    img.round().clamp(0.0, 255.0).to_kind(Kind::Uint8)
}

fn random_sign(value: f64) -> f64 {
    if worker_gen_bool(0.5) {
        -value
    } else {
        value
    }
}

/// `degenerate + factor * (img - degenerate)`, clipped to the pixel range.
fn blend(degenerate: &Tensor, img: &Tensor, factor: f64) -> Tensor {
    (degenerate + (img - degenerate) * factor).clamp(0.0, 255.0)
}

/// ITU-R 601-2 luma, `[H, W, 1]`.
fn grayscale(img: &Tensor) -> Tensor {
    img.narrow(2, 0, 1) * 0.2989 + img.narrow(2, 1, 1) * 0.5870 + img.narrow(2, 2, 1) * 0.1140
}

fn autocontrast(img: &Tensor) -> Result<Tensor> {
    let channels: Vec<Tensor> = (0..3)
        .map(|c| {
            let channel = img.select(2, c);
            let lo = channel.min().double_value(&[]);
            let hi = channel.max().double_value(&[]);
            if hi > lo {
                (channel - lo) * (255.0 / (hi - lo))
            } else {
                channel
            }
        })
        .collect();
    Ok(Tensor::stack(&channels, 2))
}

/// Histogram equalization per channel, with the PIL lookup-table construction.
fn equalize(img: &Tensor) -> Result<Tensor> {
    let (h, w, _) = img.size3()?;
    let mut channels = Vec::with_capacity(3);
    for c in 0..3 {
        let channel = img.select(2, c).round().clamp(0.0, 255.0).to_kind(Kind::Uint8);
        let values: Vec<u8> = Vec::try_from(&channel.contiguous().view([-1]))?;

        let mut histogram = [0u64; 256];
        for &v in &values {
            histogram[v as usize] += 1;
        }
        let last_nonzero = histogram.iter().rev().find(|&&count| count > 0).copied().unwrap_or(0);
        let step = (values.len() as u64 - last_nonzero) / 255;
        if step == 0 {
            channels.push(channel.to_kind(Kind::Float));
            continue;
        }

        let mut lut = [0u8; 256];
        let mut acc = step / 2;
        for (entry, count) in lut.iter_mut().zip(histogram.iter()) {
            *entry = (acc / step).min(255) as u8;
            acc += count;
        }
        let mapped: Vec<u8> = values.iter().map(|&v| lut[v as usize]).collect();
        channels.push(Tensor::from_slice(&mapped).reshape([h, w]).to_kind(Kind::Float));
    }
    Ok(Tensor::stack(&channels, 2))
}

fn posterize(img: &Tensor, bits: u32) -> Tensor {
    let shift = 8u32.saturating_sub(bits.min(8));
    let bucket = f64::from(1u32 << shift);
    (img / bucket).floor() * bucket
}

fn solarize(img: &Tensor, threshold: f64) -> Tensor {
    let below = img.lt(threshold).to_kind(Kind::Float);
    img * &below + (img * -1.0 + 255.0) * (&below * -1.0 + 1.0)
}

fn solarize_add(img: &Tensor, addition: f64, threshold: f64) -> Tensor {
    let below = img.lt(threshold).to_kind(Kind::Float);
    let added = (img + addition).clamp(0.0, 255.0);
    added * &below + img * (&below * -1.0 + 1.0)
}

/// 3x3 smoothing used by the sharpness op; borders are left untouched.
fn smooth(img: &Tensor) -> Result<Tensor> {
    let (h, w, c) = img.size3()?;
    if h < 3 || w < 3 {
        return Ok(img.copy());
    }
    let chw = img.permute([2, 0, 1]).unsqueeze(0);
    let kernel = (Tensor::from_slice(&[1.0f32, 1.0, 1.0, 1.0, 5.0, 1.0, 1.0, 1.0, 1.0])
        .reshape([1, 1, 3, 3])
        / 13.0)
        .repeat([c, 1, 1, 1]);
    let smoothed = chw
        .conv2d(&kernel, None::<Tensor>, [1, 1], [0, 0], [1, 1], c)
        .round();

    let degenerate = chw.copy();
    degenerate.narrow(2, 1, h - 2).narrow(3, 1, w - 2).copy_(&smoothed);
    Ok(degenerate.squeeze_dim(0).permute([1, 2, 0]))
}

/// Nearest-neighbour projective warp. `transform = [a0, a1, a2, b0, b1, b2]`
/// maps each output pixel `(x, y)` to the input pixel
/// `(a0 x + a1 y + a2, b0 x + b1 y + b2)`; pixels mapped outside the image
/// take `REPLACE_VALUE`.
fn warp_affine(img: &Tensor, transform: [f64; 6]) -> Result<Tensor> {
    let (h, w, c) = img.size3()?;
    let [a0, a1, a2, b0, b1, b2] = transform;
    let opts = (Kind::Float, img.device());

    let ys = Tensor::arange(h, opts).view([h, 1]).expand([h, w], false);
    let xs = Tensor::arange(w, opts).view([1, w]).expand([h, w], false);
    let src_x = (&xs * a0 + &ys * a1 + a2).round();
    let src_y = (&xs * b0 + &ys * b1 + b2).round();

    let max_x = (w - 1) as f64;
    let max_y = (h - 1) as f64;
    let inside = src_x
        .ge(0.0)
        .logical_and(&src_x.le(max_x))
        .logical_and(&src_y.ge(0.0))
        .logical_and(&src_y.le(max_y))
        .to_kind(Kind::Float)
        .unsqueeze(-1);

    let index = (src_y.clamp(0.0, max_y) * (w as f64) + src_x.clamp(0.0, max_x))
        .to_kind(Kind::Int64)
        .view([-1]);
    let gathered = img
        .reshape([h * w, c])
        .index_select(0, &index)
        .reshape([h, w, c]);

    Ok(gathered * &inside + (&inside * -1.0 + 1.0) * REPLACE_VALUE)
}

fn rotate(img: &Tensor, radians: f64) -> Result<Tensor> {
    let (h, w, _) = img.size3()?;
    let (cx, cy) = ((w - 1) as f64 / 2.0, (h - 1) as f64 / 2.0);
    let (sin, cos) = radians.sin_cos();
    warp_affine(
        img,
        [
            cos,
            sin,
            cx - cos * cx - sin * cy,
            -sin,
            cos,
            cy + sin * cx - cos * cy,
        ],
    )
}

fn cutout(img: &Tensor, pad_size: i64) -> Result<Tensor> {
    let (h, w, _) = img.size3()?;
    let out = img.copy();
    if pad_size <= 0 {
        return Ok(out);
    }
    let center_y = worker_gen_range(0..h);
    let center_x = worker_gen_range(0..w);
    let (top, bottom) = ((center_y - pad_size).max(0), (center_y + pad_size).min(h));
    let (left, right) = ((center_x - pad_size).max(0), (center_x + pad_size).min(w));

    let _ = out
        .narrow(0, top, bottom - top)
        .narrow(1, left, right - left)
        .fill_(REPLACE_VALUE);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataloader::init_worker_rng;
    use tch::Device;

    fn gradient_image() -> Tensor {
        Tensor::arange(32i64 * 32 * 3, (Kind::Int64, Device::Cpu))
            .remainder(256i64)
            .to_kind(Kind::Uint8)
            .reshape([32, 32, 3])
    }

    #[test]
    fn test_distort_preserves_shape_and_kind() -> Result<()> {
        init_worker_rng(0, 0, 3);
        let augmenter = RandAugment::default();
        let image = gradient_image();
        for _ in 0..25 {
            let out = augmenter.distort(&image)?;
            assert_eq!(out.size(), vec![32, 32, 3]);
            assert_eq!(out.kind(), Kind::Uint8);
        }
        Ok(())
    }

    #[test]
    fn test_every_op_preserves_shape() -> Result<()> {
        init_worker_rng(0, 0, 5);
        let augmenter = RandAugment::default();
        let image = gradient_image();
        for op in AugmentOp::ALL {
            let out = augmenter.apply_op(op, &image)?;
            assert_eq!(out.size(), vec![32, 32, 3], "op {:?}", op);
        }
        Ok(())
    }

    #[test]
    fn test_distort_is_reproducible_with_seed() -> Result<()> {
        let augmenter = RandAugment::default();
        let image = gradient_image();

        init_worker_rng(0, 1, 99);
        let first = augmenter.distort(&image)?;
        init_worker_rng(0, 1, 99);
        let second = augmenter.distort(&image)?;
        assert!(first.equal(&second));
        Ok(())
    }

    #[test]
    fn test_invert_twice_is_identity() -> Result<()> {
        let augmenter = RandAugment::default();
        let image = gradient_image();
        let once = augmenter.apply_op(AugmentOp::Invert, &image)?;
        let twice = augmenter.apply_op(AugmentOp::Invert, &once)?;
        assert!(twice.equal(&image));
        assert_eq!(once.int64_value(&[0, 0, 0]), 255);
        Ok(())
    }

    #[test]
    fn test_autocontrast_stretches_range() -> Result<()> {
        let image = (Tensor::rand([8, 8, 3], (Kind::Float, Device::Cpu)) * 50.0 + 100.0)
            .to_kind(Kind::Uint8);
        let out = RandAugment::default().apply_op(AugmentOp::AutoContrast, &image)?;
        for c in 0..3 {
            let channel = out.select(2, c);
            assert_eq!(channel.min().int64_value(&[]), 0);
            assert_eq!(channel.max().int64_value(&[]), 255);
        }
        Ok(())
    }

    #[test]
    fn test_translate_fills_uncovered_pixels() -> Result<()> {
        init_worker_rng(0, 0, 1);
        let image = Tensor::zeros([32, 32, 3], (Kind::Uint8, Device::Cpu));
        let out = RandAugment::default().apply_op(AugmentOp::TranslateX, &image)?;
        // A 10 pixel shift uncovers 10 columns filled with the replace value.
        let filled = out.eq(128i64).to_kind(Kind::Int64).sum(Kind::Int64).int64_value(&[]);
        assert_eq!(filled, 10 * 32 * 3);
        Ok(())
    }

    #[test]
    fn test_zero_magnitude_geometry_is_identity() -> Result<()> {
        let augmenter = RandAugment::new(1, 0.0)?;
        let image = gradient_image();
        for op in [AugmentOp::Rotate, AugmentOp::ShearX, AugmentOp::TranslateY] {
            assert!(augmenter.apply_op(op, &image)?.equal(&image), "op {:?}", op);
        }
        assert!(RandAugment::new(2, 11.0).is_err());
        Ok(())
    }

    #[test]
    fn test_rejects_float_images() {
        let image = Tensor::zeros([4, 4, 3], (Kind::Float, Device::Cpu));
        assert!(RandAugment::default().distort(&image).is_err());
    }
}
