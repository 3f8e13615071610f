//! Thread-local worker identification and randomness.
//!
//! Every random decision in the pipeline (crop offsets, flips, augmentation
//! ops, AugMix weights, mixup weights) draws from `WORKER_RNG`, so seeding it
//! per worker makes a whole pipeline reproducible.

use rand::distr::uniform::SampleUniform;
use rand::rngs::StdRng;
use rand::{Rng as _, RngCore, SeedableRng};
use std::cell::RefCell;
use std::ops::Range;

thread_local! {
    /// Thread-local worker ID.
    ///
    /// Each worker thread is assigned a unique ID (0 to num_workers-1) when spawned.
    pub static WORKER_ID: RefCell<usize> = RefCell::new(0);

    /// Thread-local RNG for deterministic randomness in workers
    pub static WORKER_RNG: RefCell<Option<StdRng>> = RefCell::new(None);
}

/// Initialize worker's RNG based on worker_id, epoch, and base seed.
/// Seed formula: base_seed + (epoch << 32) + worker_id
pub fn init_worker_rng(worker_id: usize, epoch: usize, base_seed: u64) {
    WORKER_RNG.with(|rng| *rng.borrow_mut() = Some(seeded_worker_rng(worker_id, epoch, base_seed)))
}

/// The RNG `init_worker_rng` would install, without installing it.
pub(crate) fn seeded_worker_rng(worker_id: usize, epoch: usize, base_seed: u64) -> StdRng {
    let seed = base_seed
        .wrapping_add((epoch as u64) << 32)
        .wrapping_add(worker_id as u64);
    StdRng::seed_from_u64(seed)
}

/// Installs `next` as this thread's worker RNG and returns the previous one.
pub(crate) fn replace_worker_rng(next: Option<StdRng>) -> Option<StdRng> {
    WORKER_RNG.with(|rng| std::mem::replace(&mut *rng.borrow_mut(), next))
}

/// Drops the worker RNG so later draws fall back to the thread RNG.
pub fn clear_worker_rng() {
    WORKER_RNG.with(|rng| *rng.borrow_mut() = None);
}

/// Runs `f` with the worker RNG, or the thread RNG if none was initialized.
///
/// `f` must not call back into any other `worker_*` helper: the RNG is
/// mutably borrowed for the duration of the call.
pub fn with_worker_rng<T>(f: impl FnOnce(&mut dyn RngCore) -> T) -> T {
    WORKER_RNG.with(|rng| {
        let mut rng_ref = rng.borrow_mut();
        match rng_ref.as_mut() {
            Some(rng) => f(rng),
            None => f(&mut rand::rng()),
        }
    })
}

/// Get a random bool from worker RNG, or thread_rng if not in worker context.
pub fn worker_gen_bool(p: f64) -> bool {
    with_worker_rng(|rng| rng.random_bool(p))
}

/// Uniform draw from `range` using the worker RNG.
pub fn worker_gen_range<T>(range: Range<T>) -> T
where
    T: SampleUniform + PartialOrd,
{
    with_worker_rng(|rng| rng.random_range(range))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    #[test]
    fn test_seeded_worker_rng_is_reproducible() {
        init_worker_rng(1, 3, 42);
        let first: Vec<u32> = (0..8).map(|_| worker_gen_range(0..1000)).collect();

        init_worker_rng(1, 3, 42);
        let second: Vec<u32> = (0..8).map(|_| worker_gen_range(0..1000)).collect();
        assert_eq!(first, second);

        init_worker_rng(2, 3, 42);
        let other: Vec<u32> = (0..8).map(|_| worker_gen_range(0..1000)).collect();
        assert_ne!(first, other);
        clear_worker_rng();
    }

    #[test]
    fn test_replace_worker_rng_round_trips() {
        init_worker_rng(0, 0, 5);
        let expected: Vec<u32> = {
            let mut rng = seeded_worker_rng(0, 0, 5);
            (0..4).map(|_| rng.random_range(0..1000)).collect()
        };

        let previous = replace_worker_rng(None);
        assert!(WORKER_RNG.with(|rng| rng.borrow().is_none()));
        replace_worker_rng(previous);

        let drawn: Vec<u32> = (0..4).map(|_| worker_gen_range(0..1000)).collect();
        assert_eq!(drawn, expected);
        clear_worker_rng();
    }

    #[test]
    fn test_unseeded_fallback() {
        clear_worker_rng();
        let value = worker_gen_range(5..6);
        assert_eq!(value, 5);
        assert!(worker_gen_bool(1.0));
        assert!(!worker_gen_bool(0.0));
    }
}
