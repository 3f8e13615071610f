//! Typed configuration errors.
//!
//! Everything else in the crate propagates `anyhow::Error`; these variants are
//! raised before any data is touched so callers can match on them with
//! `err.downcast_ref::<ConfigError>()`.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("proportion needs to lie in the range [0, 1] (got {0})")]
    ProportionOutOfRange(f64),

    #[error("validation_proportion needs to lie in the range [0, 1] (got {0})")]
    ValidationProportionOutOfRange(f64),

    #[error("batch size must be greater than 0")]
    ZeroBatchSize,

    #[error("invalid augmentation config: {0}")]
    InvalidAugmentation(String),

    #[error("mixup_coeff must have shape [{expected_rows}, {expected_cols}] (got {actual:?})")]
    MixupCoeffShape {
        expected_rows: usize,
        expected_cols: usize,
        actual: Vec<usize>,
    },

    #[error("the validation split only exists when validation_set is enabled")]
    MissingValidationSplit,

    #[error("invalid split specifier '{0}'")]
    InvalidSplit(String),
}
