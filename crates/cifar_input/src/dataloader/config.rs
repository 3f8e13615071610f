//! src/dataloader/config.rs
//!
//! Configuration for `load_dataset`.
//!
//! Example:
//! ```ignore
//! let config = LoaderConfig::builder(Split::Train, 128, "cifar10")
//!     .precision(Precision::BFloat16)
//!     .validation_set(true)
//!     .augmentation(AugmentationConfig::from_json(r#"{"mixup_alpha": 0.2}"#)?)
//!     .num_workers(4)
//!     .seed(42)
//!     .build();
//! ```
//!
//! # Performance considerations:
//! - `num_workers`: More workers can improve throughput but increase memory usage
//! - `prefetch_factor`: Higher values reduce accelerator starvation but use more memory

use crate::augment::Augmenter;
use crate::catalog::Split;
use crate::config::AugmentationConfig;
use crate::error::ConfigError;
use crate::precision::Precision;
use std::sync::Arc;
use std::time::Duration;

/// Which head of the train split `Split::Train` reads when a validation set
/// is carved out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrainCarveOut {
    /// Always `train[:95%]`, whatever `validation_proportion` says.
    #[default]
    Legacy,
    /// `train[:p%]` with `p = trunc(100 * (1 - validation_proportion))`, the
    /// exact complement of the validation split.
    Complement,
}

/// Configuration for `load_dataset`
#[derive(Clone)]
pub struct LoaderConfig {
    /// Nominal split to read
    pub split: Split,
    /// Number of examples per batch (must be > 0)
    pub batch_size: usize,
    /// Catalog name, optionally with a `:version` suffix
    pub dataset_name: String,
    /// Precision of emitted images and labels. Default: Float32
    pub precision: Precision,
    /// Whether to apply mean/std normalization. Default: true
    pub normalize: bool,
    /// Whether to drop a final short batch. Default: true
    pub drop_remainder: bool,
    /// Fraction of the nominal split to use, in [0, 1]. Default: 1.0
    pub proportion: f64,
    /// Whether to carve a validation split from the tail of train. Default: false
    pub validation_set: bool,
    /// Fraction of train used for validation, in [0, 1]. Default: 0.05
    pub validation_proportion: f64,
    pub augmentation: AugmentationConfig,
    pub train_carve_out: TrainCarveOut,
    /// Random seed for reproducible shuffling and augmentation.
    /// `None` draws fresh randomness from the thread RNG.
    pub seed: Option<u64>,
    /// Number of preprocessing workers (0 = everything on the caller thread)
    pub num_workers: usize,
    /// Number of batches to prefetch per worker (must be > 0 when using workers)
    pub prefetch_factor: usize,
    /// Maximum time to wait for a batch from the workers.
    /// If exceeded, returns an error (assuming workers are stuck). Default: 30s
    pub timeout: Duration,
    /// How often idle workers check for the shutdown signal.
    /// Not an error timeout - just a polling interval. Default: 100ms.
    pub worker_timeout: Duration,
    /// Augmenter behind random-augment and AugMix. Default: `RandAugment`
    pub augmenter: Option<Arc<dyn Augmenter>>,
}

impl LoaderConfig {
    pub fn builder(
        split: Split,
        batch_size: usize,
        dataset_name: impl Into<String>,
    ) -> LoaderConfigBuilder {
        LoaderConfigBuilder {
            config: Self {
                split,
                batch_size,
                dataset_name: dataset_name.into(),
                precision: Precision::Float32,
                normalize: true,
                drop_remainder: true,
                proportion: 1.0,
                validation_set: false,
                validation_proportion: 0.05,
                augmentation: AugmentationConfig::default(),
                train_carve_out: TrainCarveOut::Legacy,
                seed: None,
                num_workers: 0,
                prefetch_factor: 2,
                timeout: Duration::from_secs(30),
                worker_timeout: Duration::from_millis(100),
                augmenter: None,
            },
        }
    }

    /// Checks every option that can be checked without touching data.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.proportion) {
            return Err(ConfigError::ProportionOutOfRange(self.proportion));
        }
        if !(0.0..=1.0).contains(&self.validation_proportion) {
            return Err(ConfigError::ValidationProportionOutOfRange(
                self.validation_proportion,
            ));
        }
        if self.batch_size == 0 {
            return Err(ConfigError::ZeroBatchSize);
        }
        // A subset request reads the head of `test` instead of a carved split
        if self.split == Split::Validation && !self.validation_set && self.proportion >= 1.0 {
            return Err(ConfigError::MissingValidationSplit);
        }
        self.augmentation.validate()
    }
}

/// Builder for LoaderConfig with method chaining
pub struct LoaderConfigBuilder {
    config: LoaderConfig,
}

impl LoaderConfigBuilder {
    pub fn precision(mut self, precision: Precision) -> Self {
        self.config.precision = precision;
        self
    }

    pub fn normalize(mut self, normalize: bool) -> Self {
        self.config.normalize = normalize;
        self
    }

    pub fn drop_remainder(mut self, drop: bool) -> Self {
        self.config.drop_remainder = drop;
        self
    }

    pub fn proportion(mut self, proportion: f64) -> Self {
        self.config.proportion = proportion;
        self
    }

    pub fn validation_set(mut self, enabled: bool) -> Self {
        self.config.validation_set = enabled;
        self
    }

    pub fn validation_proportion(mut self, proportion: f64) -> Self {
        self.config.validation_proportion = proportion;
        self
    }

    pub fn augmentation(mut self, augmentation: AugmentationConfig) -> Self {
        self.config.augmentation = augmentation;
        self
    }

    pub fn train_carve_out(mut self, carve_out: TrainCarveOut) -> Self {
        self.config.train_carve_out = carve_out;
        self
    }

    /// Set the random seed for reproducible data loading.
    ///
    /// When set, this seed controls:
    /// - Shuffling of the training split (`seed + epoch`)
    /// - Random crops, flips, augmentation and mixup weights
    pub fn seed(mut self, seed: u64) -> Self {
        self.config.seed = Some(seed);
        self
    }

    pub fn num_workers(mut self, workers: usize) -> Self {
        self.config.num_workers = workers;
        self
    }

    pub fn prefetch_factor(mut self, factor: usize) -> Self {
        self.config.prefetch_factor = factor;
        self
    }

    /// Set the timeout for receiving a batch.
    ///
    /// - Too low: May fail batches during legitimate heavy processing
    /// - Too high: Delays detection of stuck workers.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    pub fn worker_timeout(mut self, worker_timeout: Duration) -> Self {
        self.config.worker_timeout = worker_timeout;
        self
    }

    pub fn augmenter(mut self, augmenter: Arc<dyn Augmenter>) -> Self {
        self.config.augmenter = Some(augmenter);
        self
    }

    /// Build the final configuration. Validation happens in `load_dataset`.
    pub fn build(self) -> LoaderConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let config = LoaderConfig::builder(Split::Train, 32, "cifar10").build();
        assert_eq!(config.precision, Precision::Float32);
        assert!(config.normalize);
        assert!(config.drop_remainder);
        assert_eq!(config.proportion, 1.0);
        assert_eq!(config.validation_proportion, 0.05);
        assert_eq!(config.train_carve_out, TrainCarveOut::Legacy);
        assert_eq!(config.num_workers, 0);
        assert_eq!(config.prefetch_factor, 2);
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate() {
        let base = || LoaderConfig::builder(Split::Train, 32, "cifar10");
        assert_eq!(
            base().proportion(1.5).build().validate(),
            Err(ConfigError::ProportionOutOfRange(1.5))
        );
        assert!(matches!(
            base().proportion(f64::NAN).build().validate(),
            Err(ConfigError::ProportionOutOfRange(_))
        ));
        assert_eq!(
            base().validation_proportion(-0.1).build().validate(),
            Err(ConfigError::ValidationProportionOutOfRange(-0.1))
        );
        assert_eq!(
            LoaderConfig::builder(Split::Train, 0, "cifar10").build().validate(),
            Err(ConfigError::ZeroBatchSize)
        );
        assert_eq!(
            LoaderConfig::builder(Split::Validation, 8, "cifar10").build().validate(),
            Err(ConfigError::MissingValidationSplit)
        );
        assert!(LoaderConfig::builder(Split::Validation, 8, "cifar10")
            .validation_set(true)
            .build()
            .validate()
            .is_ok());
        assert!(LoaderConfig::builder(Split::Validation, 8, "cifar10")
            .proportion(0.1)
            .build()
            .validate()
            .is_ok());
    }
}
