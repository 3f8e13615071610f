use anyhow::{ensure, Result};
use rand::seq::SliceRandom;
use rand::{rngs::StdRng, SeedableRng};

/// A `Sampler` defines the order in which a pipeline visits a dataset.
///
/// # Associated type
/// - `Item`: The handle yielded by the iterator: a `usize` index for a single
///   example, or `Vec<usize>` for a batch of them.
///
/// # Method
/// - `iter(epoch)`: returns a sequential or shuffled sequence for that epoch.
///    - The sampler combines `epoch` with its base seed so every epoch gets a
///      fresh, reproducible order.
///
/// Implementations must be `Send + Sync`, and the iterators they return own
/// their state, so an index stream can move onto the pipeline's feeder thread
/// independently of the sampler.
pub trait Sampler: Send + Sync {
    type Item: Send + Sync + 'static;

    fn iter(&self, epoch: usize) -> Box<dyn Iterator<Item = Self::Item> + Send>;
}

/// ============================================================================
/// Yields indices sequentially in order `(0,1,2,...,dataset_size-1)`.
///
/// # Examples
/// ```ignore
/// let sampler = SequentialSampler::new(5);
/// let indices: Vec<_> = sampler.iter(0).collect();
/// assert_eq!(indices, vec![0, 1, 2, 3, 4]);
/// ```
#[derive(Debug, Clone)]
pub struct SequentialSampler {
    dataset_size: usize,
}

impl SequentialSampler {
    pub fn new(dataset_size: usize) -> Self {
        Self { dataset_size }
    }
}

impl Sampler for SequentialSampler {
    type Item = usize;

    fn iter(&self, _epoch: usize) -> Box<dyn Iterator<Item = usize> + Send> {
        Box::new(0..self.dataset_size)
    }
}

/// ============================================================================
/// A random permutation of `0..dataset_size` per epoch.
///
/// # Seed Handling
/// For each epoch, a new RNG is derived as `base_seed + epoch`. So at epoch 0
/// the RNG seed is `base_seed`, at epoch 1 it is `base_seed + 1`:
///   - fresh shuffle each epoch
///   - still reproducible with the same `base_seed`.
///
/// Shuffling the full split is what a shuffle buffer of at least the split
/// size produces, which is the buffer the training pipeline asks for.
#[derive(Debug, Clone)]
pub struct RandomSampler {
    dataset_size: usize,
    base_seed: u64,
}

impl RandomSampler {
    pub fn new(dataset_size: usize, base_seed: u64) -> Result<Self> {
        ensure!(
            dataset_size > 0,
            "Cannot shuffle an empty dataset (dataset_size=0)"
        );
        Ok(Self {
            dataset_size,
            base_seed,
        })
    }

    /// Derives a deterministic random number generator for the given epoch
    #[inline]
    fn derive_rng_for_epoch(&self, epoch: usize) -> StdRng {
        StdRng::seed_from_u64(self.base_seed.wrapping_add(epoch as u64))
    }
}

impl Sampler for RandomSampler {
    type Item = usize;

    fn iter(&self, epoch: usize) -> Box<dyn Iterator<Item = usize> + Send> {
        let mut rng = self.derive_rng_for_epoch(epoch);
        let mut indices: Vec<_> = (0..self.dataset_size).collect();
        indices.shuffle(&mut rng);
        Box::new(indices.into_iter())
    }
}

/// ============================================================================
/// Repeats an inner sampler forever: `iter(epoch)` yields the inner epoch
/// `epoch`, then `epoch + 1`, and so on.
///
/// Batching a `RepeatSampler` lets batches straddle epoch boundaries, so a
/// training stream never emits a short batch.
#[derive(Debug, Clone)]
pub struct RepeatSampler<S> {
    sampler: S,
}

impl<S: Sampler + Clone + 'static> RepeatSampler<S> {
    pub fn new(sampler: S) -> Self {
        Self { sampler }
    }
}

impl<S: Sampler + Clone + 'static> Sampler for RepeatSampler<S> {
    type Item = S::Item;

    fn iter(&self, epoch: usize) -> Box<dyn Iterator<Item = Self::Item> + Send> {
        let sampler = self.sampler.clone();
        Box::new((epoch..).flat_map(move |e| sampler.iter(e)))
    }
}

/// ============================================================================
/// Groups the indices of an inner sampler into mini-batches.
///
/// # Arguments:
/// - `sampler`: The inner sampler.
/// - `batch_size`: Number of indices per mini-batch.
/// - `drop_last`: If `true`, a final mini-batch shorter than `batch_size` is dropped.
///
/// # Example
/// ```ignore
/// let batch_sampler = BatchSampler::new(SequentialSampler::new(100), 32, false)?;
/// for mini_batch in batch_sampler.iter(0) {
///     // `mini_batch` is Vec<usize> of length 32, except the last mini-batch
///     println!("Batch size: {}", mini_batch.len());
/// }
/// ```
#[derive(Debug, Clone)]
pub struct BatchSampler<S> {
    sampler: S,
    batch_size: usize,
    drop_last: bool,
}

impl<S: Sampler> BatchSampler<S> {
    pub fn new(sampler: S, batch_size: usize, drop_last: bool) -> Result<Self> {
        ensure!(
            batch_size > 0,
            "batch_size must be > 0, but got batch_size={}",
            batch_size
        );
        Ok(Self {
            sampler,
            batch_size,
            drop_last,
        })
    }
}

impl<S: Sampler> Sampler for BatchSampler<S> {
    type Item = Vec<S::Item>;

    fn iter(&self, epoch: usize) -> Box<dyn Iterator<Item = Self::Item> + Send> {
        let mut sampler_iter = self.sampler.iter(epoch);
        let batch_size = self.batch_size;
        let drop_last = self.drop_last;

        Box::new(std::iter::from_fn(move || {
            let mut mini_batch = Vec::with_capacity(batch_size);
            for _ in 0..batch_size {
                if let Some(item) = sampler_iter.next() {
                    mini_batch.push(item);
                } else {
                    break;
                }
            }
            if mini_batch.len() == batch_size || (!drop_last && !mini_batch.is_empty()) {
                Some(mini_batch)
            } else {
                None
            }
        }))
    }
}
