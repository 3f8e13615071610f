//! src/config.rs
//!
//! Augmentation options shared by every stage of a pipeline.
//!
//! ```ignore
//! let config = AugmentationConfig::builder()
//!     .mixup_alpha(0.2)
//!     .augmix(true)
//!     .aug_count(2)
//!     .build()?;
//! ```
//!
//! Options can also come from JSON, where every missing field keeps its
//! default:
//!
//! ```ignore
//! let config = AugmentationConfig::from_json(r#"{"mixup_alpha": 0.2}"#)?;
//! ```

use crate::error::ConfigError;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tch::{Kind, Tensor};

/// Augmentation and label-mixing options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AugmentationConfig {
    /// Use per-class mixup coefficients instead of a fixed alpha.
    pub adaptive_mixup: bool,
    /// Apply the augmenter to every training image.
    pub random_augment: bool,
    /// Beta concentration for mixup; 0 disables mixup.
    pub mixup_alpha: f64,
    /// Number of ensemble members (rows of the adaptive mixup matrix).
    pub ensemble_size: usize,
    /// Only used to decide on one-hot labels; smoothing itself happens downstream.
    pub label_smoothing: f64,
    pub augmix: bool,
    /// Chain length per AugMix branch; negative draws each branch from `[1, 4)`.
    pub augmix_depth: i64,
    pub augmix_width: usize,
    pub augmix_prob_coeff: f64,
    /// Augmented copies per example.
    pub aug_count: usize,
    /// Adaptive mixup coefficients, `[ensemble_size, num_classes]`.
    pub mixup_coeff: Option<Vec<Vec<f64>>>,
}

impl Default for AugmentationConfig {
    fn default() -> Self {
        Self {
            adaptive_mixup: false,
            random_augment: false,
            mixup_alpha: 0.0,
            ensemble_size: 1,
            label_smoothing: 0.0,
            augmix: false,
            augmix_depth: -1,
            augmix_width: 3,
            augmix_prob_coeff: 0.5,
            aug_count: 1,
            mixup_coeff: None,
        }
    }
}

impl AugmentationConfig {
    pub fn builder() -> AugmentationConfigBuilder {
        AugmentationConfigBuilder::default()
    }

    /// Parses caller options from JSON, filling every missing field with its
    /// default, and validates the result.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).context("Failed to parse augmentation config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::InvalidAugmentation(msg));

        if !(self.mixup_alpha >= 0.0 && self.mixup_alpha.is_finite()) {
            return invalid(format!("mixup_alpha must be >= 0 (got {})", self.mixup_alpha));
        }
        if !(self.label_smoothing >= 0.0 && self.label_smoothing.is_finite()) {
            return invalid(format!(
                "label_smoothing must be >= 0 (got {})",
                self.label_smoothing
            ));
        }
        if self.ensemble_size == 0 {
            return invalid("ensemble_size must be at least 1".into());
        }
        if self.augmix_width == 0 {
            return invalid("augmix_width must be at least 1".into());
        }
        if !(self.augmix_prob_coeff > 0.0 && self.augmix_prob_coeff.is_finite()) {
            return invalid(format!(
                "augmix_prob_coeff must be > 0 (got {})",
                self.augmix_prob_coeff
            ));
        }
        if self.aug_count == 0 {
            return invalid("aug_count must be at least 1".into());
        }
        // Adaptive mixup hands one AugMix copy to each ensemble member.
        if self.adaptive_mixup
            && self.augmix
            && self.mixup_alpha > 0.0
            && self.aug_count + 1 != self.ensemble_size
        {
            return invalid(format!(
                "adaptive mixup with augmix needs aug_count + 1 == ensemble_size (got {} and {})",
                self.aug_count + 1,
                self.ensemble_size
            ));
        }
        Ok(())
    }

    /// Whether training labels are one-hot encoded.
    pub fn one_hot_labels(&self) -> bool {
        self.mixup_alpha > 0.0 || self.label_smoothing > 0.0
    }

    /// Resolves the adaptive mixup coefficients for a dataset with
    /// `num_classes` classes.
    ///
    /// A supplied matrix is validated against `[ensemble_size, num_classes]`.
    /// With `adaptive_mixup` and nothing supplied, the result is all ones:
    /// hard targets in the first epoch.
    pub fn ensure_mixup_coeff(
        &self,
        num_classes: usize,
    ) -> Result<Option<MixupCoeff>, ConfigError> {
        match &self.mixup_coeff {
            Some(rows) => {
                let coeff = MixupCoeff::from_rows(rows)?;
                if coeff.shape() != (self.ensemble_size, num_classes) {
                    return Err(ConfigError::MixupCoeffShape {
                        expected_rows: self.ensemble_size,
                        expected_cols: num_classes,
                        actual: vec![coeff.rows, coeff.cols],
                    });
                }
                Ok(Some(coeff))
            }
            None if self.adaptive_mixup => {
                Ok(Some(MixupCoeff::ones(self.ensemble_size, num_classes)))
            }
            None => Ok(None),
        }
    }
}

/// Builder for AugmentationConfig with method chaining
#[derive(Default)]
pub struct AugmentationConfigBuilder {
    config: AugmentationConfig,
}

impl AugmentationConfigBuilder {
    pub fn adaptive_mixup(mut self, enabled: bool) -> Self {
        self.config.adaptive_mixup = enabled;
        self
    }

    pub fn random_augment(mut self, enabled: bool) -> Self {
        self.config.random_augment = enabled;
        self
    }

    pub fn mixup_alpha(mut self, alpha: f64) -> Self {
        self.config.mixup_alpha = alpha;
        self
    }

    pub fn ensemble_size(mut self, size: usize) -> Self {
        self.config.ensemble_size = size;
        self
    }

    pub fn label_smoothing(mut self, smoothing: f64) -> Self {
        self.config.label_smoothing = smoothing;
        self
    }

    pub fn augmix(mut self, enabled: bool) -> Self {
        self.config.augmix = enabled;
        self
    }

    pub fn augmix_depth(mut self, depth: i64) -> Self {
        self.config.augmix_depth = depth;
        self
    }

    pub fn augmix_width(mut self, width: usize) -> Self {
        self.config.augmix_width = width;
        self
    }

    pub fn augmix_prob_coeff(mut self, coeff: f64) -> Self {
        self.config.augmix_prob_coeff = coeff;
        self
    }

    pub fn aug_count(mut self, count: usize) -> Self {
        self.config.aug_count = count;
        self
    }

    pub fn mixup_coeff(mut self, coeff: Vec<Vec<f64>>) -> Self {
        self.config.mixup_coeff = Some(coeff);
        self
    }

    /// Validates and returns the configuration.
    pub fn build(self) -> Result<AugmentationConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

// ============================================================================
// MixupCoeff
// ============================================================================

/// Per-(ensemble member, class) mixup concentrations, row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct MixupCoeff {
    rows: usize,
    cols: usize,
    values: Vec<f64>,
}

impl MixupCoeff {
    pub fn ones(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            values: vec![1.0; rows * cols],
        }
    }

    pub fn from_rows(rows: &[Vec<f64>]) -> Result<Self, ConfigError> {
        let cols = rows.first().map_or(0, Vec::len);
        if rows.iter().any(|row| row.len() != cols) {
            return Err(ConfigError::InvalidAugmentation(
                "mixup_coeff rows must all have the same length".into(),
            ));
        }
        if rows.iter().flatten().any(|v| !(*v >= 0.0 && v.is_finite())) {
            return Err(ConfigError::InvalidAugmentation(
                "mixup_coeff entries must be finite and >= 0".into(),
            ));
        }
        Ok(Self {
            rows: rows.len(),
            cols,
            values: rows.concat(),
        })
    }

    /// `(ensemble_size, num_classes)`
    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    pub fn get(&self, row: usize, col: usize) -> Option<f64> {
        (row < self.rows && col < self.cols).then(|| self.values[row * self.cols + col])
    }

    pub fn to_rows(&self) -> Vec<Vec<f64>> {
        self.values.chunks(self.cols.max(1)).map(<[f64]>::to_vec).collect()
    }

    pub fn to_tensor(&self) -> Tensor {
        Tensor::from_slice(&self.values)
            .to_kind(Kind::Float)
            .view([self.rows as i64, self.cols as i64])
    }
}
