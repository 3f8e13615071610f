//! src/dataloader/loader.rs
//!
//! `load_dataset`: turns a catalog and a `LoaderConfig` into a `BatchStream`.
//!
//! # Stages
//!
//! 1. Validate the configuration (`ConfigError`, before any data access)
//! 2. Look up the dataset and resolve the mixup coefficients
//! 3. Resolve the nominal split into a concrete `SplitSpec`
//! 4. Load the split into memory
//! 5. Build the sampler:
//!    - training: reshuffled every epoch (`seed + epoch`) and repeated forever
//!    - evaluation: one sequential pass
//! 6. Preprocess, collate and (training only) mix each batch, on the caller
//!    thread or on `num_workers` workers
//!
//! # Seed Coordination
//!
//! `config.seed` drives both the shuffle order and every random transform.
//! Without a seed the shuffle seed is drawn once per stream and transforms
//! use the thread RNG.

use anyhow::{ensure, Context, Result};
use log::{info, warn};
use std::sync::Arc;

use super::config::{LoaderConfig, TrainCarveOut};
use super::pipeline::BatchPipeline;
use super::stream::{BatchStream, IndexBatches, StreamInfo};
use crate::augment::BatchMixup;
use crate::catalog::{BaseSplit, DatasetCatalog, Split, SplitSpec};
use crate::error::ConfigError;
use crate::preprocess::Preprocessor;
use crate::sampler::{BatchSampler, RandomSampler, RepeatSampler, Sampler, SequentialSampler};

/// Head of the train split used for training under `TrainCarveOut::Legacy`.
pub const LEGACY_TRAIN_PERCENT: u32 = 95;

/// Loads `config.dataset_name` from `catalog` as a stream of batches.
///
/// # Example
/// ```ignore
/// let catalog = CifarCatalog::new("/data/cifar");
/// let config = LoaderConfig::builder(Split::Train, 128, "cifar10")
///     .seed(42)
///     .num_workers(4)
///     .build();
/// for batch in load_dataset(&catalog, config)?.take(100) {
///     let batch = batch?; // images [128, 32, 32, 3], labels [128]
/// }
/// ```
pub fn load_dataset(catalog: &dyn DatasetCatalog, config: LoaderConfig) -> Result<BatchStream> {
    config.validate()?;
    ensure!(
        config.num_workers == 0 || config.prefetch_factor > 0,
        "prefetch_factor must be > 0 when num_workers > 0"
    );

    let info = catalog
        .info(&config.dataset_name)
        .with_context(|| format!("Unknown dataset '{}'", config.dataset_name))?;
    let mixup_coeff = config.augmentation.ensure_mixup_coeff(info.num_classes)?;
    let split = resolve_split(&config)?;

    let dataset = catalog
        .load(&config.dataset_name, &split)
        .with_context(|| format!("Failed to load '{}' of '{}'", split, config.dataset_name))?;
    let num_examples = dataset.len();

    let preprocessor = Preprocessor::for_split(config.split, &config, info.num_classes, info.image_shape)?;
    let mixup = if config.split.is_train() {
        BatchMixup::from_config(Arc::new(config.augmentation.clone()), mixup_coeff.as_ref())?
    } else {
        None
    };

    let (batches, num_batches) = index_batches(&config, num_examples)?;

    info!(
        "Loading {} ({}): {} examples, batch_size={}, {}, precision={:?}, workers={}{}",
        info.name,
        split,
        num_examples,
        config.batch_size,
        match num_batches {
            Some(n) => format!("{} batches", n),
            None => "repeating".to_string(),
        },
        config.precision,
        config.num_workers,
        match &mixup {
            Some(BatchMixup::Adaptive { .. }) => ", adaptive mixup",
            Some(BatchMixup::Fixed { .. }) => ", mixup",
            None => "",
        }
    );

    let pipeline = Arc::new(BatchPipeline::new(
        Arc::new(dataset),
        preprocessor,
        mixup,
        config.seed,
    ));
    let stream_info = StreamInfo {
        dataset: info,
        split,
        num_examples,
        num_batches,
        mixup_coeff,
    };

    if config.num_workers == 0 {
        Ok(BatchStream::single(pipeline, batches, stream_info))
    } else {
        BatchStream::prefetched(
            pipeline,
            batches,
            stream_info,
            config.num_workers,
            config.prefetch_factor,
            config.timeout,
            config.worker_timeout,
        )
    }
}

/// The index batches of one stream, with their count when finite.
fn index_batches(config: &LoaderConfig, num_examples: usize) -> Result<(IndexBatches, Option<usize>)> {
    let batch_size = config.batch_size;

    if config.split.is_train() {
        if num_examples == 0 {
            warn!("The training split is empty, the stream yields no batches");
            let sampler = BatchSampler::new(SequentialSampler::new(0), batch_size, true)?;
            return Ok((sampler.iter(0), Some(0)));
        }
        let seed = config.seed.unwrap_or_else(rand::random);
        let shuffled = RepeatSampler::new(RandomSampler::new(num_examples, seed)?);
        let sampler = BatchSampler::new(shuffled, batch_size, true)?;
        return Ok((sampler.iter(0), None));
    }

    let num_batches = if config.drop_remainder {
        num_examples / batch_size
    } else {
        num_examples.div_ceil(batch_size)
    };
    let sampler = BatchSampler::new(
        SequentialSampler::new(num_examples),
        batch_size,
        config.drop_remainder,
    )?;
    Ok((sampler.iter(0), Some(num_batches)))
}

/// Maps the nominal split of `config` onto a concrete slice of a catalog split.
///
/// | `proportion` | `validation_set` | `Train`        | `Validation`  | `Test`       |
/// |--------------|------------------|----------------|---------------|--------------|
/// | 1            | yes              | `train[:95%]`* | `train[p%:]`  | `test`       |
/// | 1            | no               | `train`        | error         | `test`       |
/// | q < 1        | any              | `train[:q%]`   | `test[:q%]`   | `test[:q%]`  |
///
/// `p = trunc(100 * (1 - validation_proportion))`, `q = trunc(100 * proportion)`.
/// (*) `train[:p%]` under `TrainCarveOut::Complement`.
pub fn resolve_split(config: &LoaderConfig) -> Result<SplitSpec, ConfigError> {
    if !(0.0..=1.0).contains(&config.proportion) {
        return Err(ConfigError::ProportionOutOfRange(config.proportion));
    }
    if !(0.0..=1.0).contains(&config.validation_proportion) {
        return Err(ConfigError::ValidationProportionOutOfRange(
            config.validation_proportion,
        ));
    }

    if config.proportion < 1.0 {
        let q = (100.0 * config.proportion).trunc() as u32;
        warn!(
            "Using {}% of the {} split as a subset without a validation set",
            q, config.split
        );
        let base = if config.split.is_train() {
            BaseSplit::Train
        } else {
            BaseSplit::Test
        };
        return Ok(SplitSpec::head_percent(base, q));
    }

    if !config.validation_set {
        return match config.split {
            Split::Train => Ok(SplitSpec::full(BaseSplit::Train)),
            Split::Test => Ok(SplitSpec::full(BaseSplit::Test)),
            Split::Validation => Err(ConfigError::MissingValidationSplit),
        };
    }

    let p = (100.0 * (1.0 - config.validation_proportion)).trunc() as u32;
    Ok(match config.split {
        Split::Validation => SplitSpec::tail_percent(BaseSplit::Train, p),
        Split::Test => SplitSpec::full(BaseSplit::Test),
        Split::Train => match config.train_carve_out {
            TrainCarveOut::Complement => SplitSpec::head_percent(BaseSplit::Train, p),
            TrainCarveOut::Legacy => {
                if p != LEGACY_TRAIN_PERCENT {
                    warn!(
                        "Training on train[:{}%] while validating on train[{}%:]; \
                         use TrainCarveOut::Complement to train on train[:{}%]",
                        LEGACY_TRAIN_PERCENT, p, p
                    );
                }
                SplitSpec::head_percent(BaseSplit::Train, LEGACY_TRAIN_PERCENT)
            }
        },
    })
}
