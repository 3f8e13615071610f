//! src/dataloader/pipeline.rs
//!
//! The per-batch work shared by the caller thread and the workers:
//! gather -> preprocess -> collate -> mixup.

use anyhow::{Context, Result};
use std::sync::Arc;

use super::common::thread::{replace_worker_rng, seeded_worker_rng};
use crate::augment::BatchMixup;
use crate::batch::Batch;
use crate::collator::{Collator, StackCollator};
use crate::dataset::InMemoryDataset;
use crate::preprocess::Preprocessor;
use crate::transforms::Transform;

/// Immutable state needed to turn a list of indices into a finished batch.
#[derive(Debug)]
pub(crate) struct BatchPipeline {
    dataset: Arc<InMemoryDataset>,
    preprocessor: Preprocessor,
    collator: StackCollator,
    mixup: Option<BatchMixup>,
    seed: Option<u64>,
}

impl BatchPipeline {
    pub(crate) fn new(
        dataset: Arc<InMemoryDataset>,
        preprocessor: Preprocessor,
        mixup: Option<BatchMixup>,
        seed: Option<u64>,
    ) -> Self {
        Self {
            dataset,
            preprocessor,
            collator: StackCollator,
            mixup,
            seed,
        }
    }

    pub(crate) fn dataset(&self) -> &InMemoryDataset {
        &self.dataset
    }

    /// Builds batch `batch_index` from `indices`.
    ///
    /// With a seed, the batch draws from an RNG seeded from the batch index
    /// (in the epoch slot of `init_worker_rng`), so a batch comes out the
    /// same whichever thread prepares it. Without one it draws from the
    /// thread RNG. The calling thread's worker RNG is restored afterwards.
    pub(crate) fn process(&self, batch_index: usize, indices: &[usize]) -> Result<Batch> {
        let batch_rng = self
            .seed
            .map(|seed| seeded_worker_rng(0, batch_index, seed));
        let previous = replace_worker_rng(batch_rng);
        let result = self.build(indices);
        replace_worker_rng(previous);

        result.with_context(|| {
            format!(
                "Failed to prepare batch {} from indices {:?} (dataset size: {})",
                batch_index,
                indices,
                self.dataset.len()
            )
        })
    }

    fn build(&self, indices: &[usize]) -> Result<Batch> {
        let examples = self
            .dataset
            .gather(indices)?
            .into_iter()
            .map(|example| self.preprocessor.apply(example))
            .collect::<Result<Vec<_>>>()?;

        let batch = self.collator.collate(&examples)?;
        match &self.mixup {
            Some(mixup) => mixup.mix(&batch),
            None => Ok(batch),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::example::Example;
    use crate::precision::Precision;
    use crate::preprocess::EvalPreprocessor;
    use tch::{Device, Kind, Tensor};

    fn pipeline(len: usize) -> Result<BatchPipeline> {
        let examples = (0..len)
            .map(|i| {
                let image = Tensor::full([4, 4, 3], i as i64, (Kind::Uint8, Device::Cpu));
                Example::raw(image, (i % 3) as i64)
            })
            .collect::<Result<Vec<_>>>()?;
        let preprocessor = Preprocessor::Eval(EvalPreprocessor::new(
            false,
            Precision::Float32,
            3,
            [4, 4, 3],
        ));
        Ok(BatchPipeline::new(
            Arc::new(InMemoryDataset::new(examples)),
            preprocessor,
            None,
            Some(7),
        ))
    }

    #[test]
    fn test_process_gathers_in_index_order() -> Result<()> {
        let pipeline = pipeline(6)?;
        let batch = pipeline.process(0, &[4, 1])?;
        assert_eq!(batch.images.size(), vec![2, 4, 4, 3]);
        assert_eq!(batch.labels.size(), vec![2]);
        assert_eq!(batch.labels.double_value(&[0]), 1.0);
        assert_eq!(batch.labels.double_value(&[1]), 1.0);
        assert!((batch.images.double_value(&[0, 0, 0, 0]) - 4.0 / 255.0).abs() < 1e-6);
        Ok(())
    }

    #[test]
    fn test_process_restores_the_caller_rng() -> Result<()> {
        use crate::dataloader::{clear_worker_rng, init_worker_rng, worker_gen_range};

        init_worker_rng(3, 0, 99);
        let expected: Vec<u32> = (0..4).map(|_| worker_gen_range(0..1000)).collect();

        for seed in [None, Some(7)] {
            let mut pipeline = pipeline(4)?;
            pipeline.seed = seed;
            init_worker_rng(3, 0, 99);
            pipeline.process(0, &[0, 1])?;
            let drawn: Vec<u32> = (0..4).map(|_| worker_gen_range(0..1000)).collect();
            assert_eq!(drawn, expected, "seed {:?} leaked into the caller RNG", seed);
        }
        clear_worker_rng();
        Ok(())
    }

    #[test]
    fn test_process_reports_bad_indices() -> Result<()> {
        let pipeline = pipeline(3)?;
        let err = pipeline.process(5, &[0, 9]).unwrap_err();
        assert!(format!("{:#}", err).contains("batch 5"));
        Ok(())
    }
}
