use crate::precision::Precision;
use crate::transforms::Transform;
use anyhow::{ensure, Result};
use tch::{Kind, Tensor};

/// Per-channel mean of the CIFAR-10 training set (RGB, images in [0, 1]).
pub const CIFAR_MEAN: [f32; 3] = [0.4914, 0.4822, 0.4465];
/// Per-channel standard deviation of the CIFAR-10 training set.
pub const CIFAR_STD: [f32; 3] = [0.2023, 0.1994, 0.2010];

/// Casts an image to `precision`, rescaling `Uint8` pixels into `[0, 1]`.
/// Floating inputs are assumed to already be in `[0, 1]` and are only cast.
pub fn convert_image_dtype(image: &Tensor, precision: Precision) -> Tensor {
    let kind = precision.kind();
    match image.kind() {
        Kind::Uint8 => image.to_kind(kind) / 255.0,
        _ => image.to_kind(kind),
    }
}

/// Converts `image` to `precision` and standardizes it with the CIFAR statistics.
///
/// ```text
/// output[..., c] = (convert(input)[..., c] - CIFAR_MEAN[c]) / CIFAR_STD[c]
/// ```
pub fn normalize_convert_image(image: &Tensor, precision: Precision) -> Result<Tensor> {
    Normalize::cifar(precision).normalize(image)
}

/// Inverse of [`normalize_convert_image`]: maps a standardized image back to
/// `[0, 1]` as `Float`.
pub fn denormalize(image: &Tensor) -> Result<Tensor> {
    let channels = *image.size().last().unwrap_or(&0);
    ensure!(
        channels == CIFAR_MEAN.len() as i64,
        "Expected {} trailing channels, got shape {:?}",
        CIFAR_MEAN.len(),
        image.size()
    );
    let mean = Tensor::from_slice(&CIFAR_MEAN);
    let std = Tensor::from_slice(&CIFAR_STD);
    Ok(image.to_kind(Kind::Float) * std + mean)
}

// ============================================================================
// Normalize
// ============================================================================

/// Normalizes channel-last tensors using channel-wise statistics.
///
/// # Arguments:
/// - `mean`: per-channel means
/// - `std`: per-channel standard deviation
/// - `precision`: output precision
///
/// The input's trailing dimension must match the number of channels; any
/// leading dimensions (augmentation copies, batch) broadcast.
#[derive(Debug, Clone)]
pub struct Normalize {
    mean: Vec<f32>,
    std: Vec<f32>,
    precision: Precision,
}

impl Normalize {
    pub fn new(mean: &[f32], std: &[f32], precision: Precision) -> Result<Self> {
        ensure!(!mean.is_empty(), "Normalization mean cannot be empty");
        ensure!(
            mean.len() == std.len(),
            "The mean and standard deviation for normalization must match in dimension \
             (mean has {}, std has {})",
            mean.len(),
            std.len()
        );
        ensure!(
            std.iter().all(|s| *s > 0.0),
            "Normalization std must be strictly positive"
        );
        Ok(Self {
            mean: mean.to_vec(),
            std: std.to_vec(),
            precision,
        })
    }

    /// CIFAR statistics in the given precision
    pub fn cifar(precision: Precision) -> Self {
        Self {
            mean: CIFAR_MEAN.to_vec(),
            std: CIFAR_STD.to_vec(),
            precision,
        }
    }

    pub fn precision(&self) -> Precision {
        self.precision
    }

    pub fn normalize(&self, image: &Tensor) -> Result<Tensor> {
        let channels = *image.size().last().unwrap_or(&0);
        ensure!(
            channels as usize == self.mean.len(),
            "Channel count mismatch: input has shape {:?} but normalization expects {} trailing channels",
            image.size(),
            self.mean.len()
        );

        let kind = self.precision.kind();
        let mean_t = Tensor::from_slice(&self.mean).to_kind(kind);
        let std_t = Tensor::from_slice(&self.std).to_kind(kind);

        Ok((convert_image_dtype(image, self.precision) - mean_t) / std_t)
    }
}

impl Transform<Tensor, Tensor> for Normalize {
    fn apply(&self, image: Tensor) -> Result<Tensor> {
        self.normalize(&image)
    }
}

// ============================================================================
// ConvertImageDtype
// ============================================================================

/// Precision conversion without standardization; used when a pipeline is
/// built with `normalize = false`.
#[derive(Debug, Clone, Copy)]
pub struct ConvertImageDtype(pub Precision);

impl Transform<Tensor, Tensor> for ConvertImageDtype {
    fn apply(&self, image: Tensor) -> Result<Tensor> {
        Ok(convert_image_dtype(&image, self.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tch::Device;

    #[test]
    fn test_normalize_round_trip() -> Result<()> {
        let image = Tensor::randint(256, [8, 8, 3], (Kind::Uint8, Device::Cpu));
        let normalized = normalize_convert_image(&image, Precision::Float32)?;
        assert_eq!(normalized.kind(), Kind::Float);

        let restored = denormalize(&normalized)?;
        let expected = image.to_kind(Kind::Float) / 255.0;
        assert!(restored.allclose(&expected, 1e-5, 1e-5, false));
        Ok(())
    }

    #[test]
    fn test_normalize_float_input_is_not_rescaled() -> Result<()> {
        let image = Tensor::full([2, 2, 3], 0.5, (Kind::Float, Device::Cpu));
        let normalized = normalize_convert_image(&image, Precision::Float32)?;
        let expected = (0.5 - CIFAR_MEAN[0] as f64) / CIFAR_STD[0] as f64;
        assert!((normalized.double_value(&[0, 0, 0]) - expected).abs() < 1e-5);
        Ok(())
    }

    #[test]
    fn test_normalize_bfloat16() -> Result<()> {
        let image = Tensor::zeros([4, 4, 3], (Kind::Uint8, Device::Cpu));
        let normalized = normalize_convert_image(&image, Precision::BFloat16)?;
        assert_eq!(normalized.kind(), Kind::BFloat16);

        let restored = denormalize(&normalized)?;
        assert!(restored.abs().max().double_value(&[]) < 1e-2);
        Ok(())
    }

    #[test]
    fn test_normalize_rejects_wrong_channels() {
        let image = Tensor::zeros([3, 4, 4], (Kind::Uint8, Device::Cpu));
        assert!(normalize_convert_image(&image, Precision::Float32).is_err());
        assert!(Normalize::new(&[0.5], &[0.5, 0.5], Precision::Float32).is_err());
    }

    #[test]
    fn test_convert_image_dtype() -> Result<()> {
        let image = Tensor::full([1, 1, 3], 255i64, (Kind::Uint8, Device::Cpu));
        let converted = ConvertImageDtype(Precision::Float32).apply(image)?;
        assert_eq!(converted.kind(), Kind::Float);
        assert_eq!(converted.double_value(&[0, 0, 0]), 1.0);
        Ok(())
    }
}
