//! src/dataloader/mod.rs
//!
//! This module implements `load_dataset`.
//!
//! `load_dataset` coordinates the catalog, sampler, preprocessor, collator and
//! batch mixup to produce a stream of ready-to-train batches, with optional
//! parallel preprocessing.
//!
//! # Architecture Overview
//!
//! ```text
//!                  ┌────────────────┐
//!                  │ DatasetCatalog │ (CIFAR binaries, image folders, memory)
//!                  └───────┬────────┘
//!                          │ resolve_split → load
//!                          ↓
//!                  ┌────────────────┐
//!                  │ InMemoryDataset│ (raw Uint8 HWC + class index)
//!                  └───────┬────────┘
//!                          │
//!                          ↓
//!                     ┌─────────┐
//!                     │ Sampler │ (shuffle + repeat, or one pass)
//!                     └────┬────┘
//!                          │ index batches (feeder thread)
//!                          ↓
//!                   [Worker Threads] (optional parallelism)
//!                          │
//!                          │ gather → Preprocessor → StackCollator → BatchMixup
//!                          ↓
//!                   ┌─────────────┐
//!                   │ BatchStream │ (in-order, prefetched)
//!                   └─────────────┘
//! ```
//!
//! # Module Structure
//!
//! ```text
//! src/dataloader/
//! ├── mod.rs             # Public API exports + module-level architecture docs
//! ├── config.rs          # LoaderConfig, builder, and validation
//! ├── loader.rs          # load_dataset and split resolution
//! ├── pipeline.rs        # Per-batch work shared by all threads
//! ├── stream.rs          # BatchStream (single-threaded or prefetched)
//! ├── workers/
//! │   ├── mod.rs         # Task types and the worker loop
//! │   └── pool.rs        # Generic `WorkerPool<Task, Output>` implementation
//! └── common/
//!     ├── mod.rs         # Module declarations for shared utilities
//!     └── thread.rs      # Thread-local worker ID and RNG
//! ```
//!
//! # Example Usage
//!
//! ## Single-threaded evaluation:
//! ```ignore
//! let catalog = CifarCatalog::new("/data/cifar");
//! let config = LoaderConfig::builder(Split::Test, 100, "cifar10").build();
//! for batch in load_dataset(&catalog, config)? {
//!     let batch: Batch = batch?;
//!     // images [100, 32, 32, 3] Float32, labels [100]
//! }
//! ```
//!
//! ## Multi-threaded training with mixup:
//! ```ignore
//! let augmentation = AugmentationConfig::builder().mixup_alpha(0.2).build()?;
//! let config = LoaderConfig::builder(Split::Train, 128, "cifar10")
//!     .augmentation(augmentation)
//!     .num_workers(4)
//!     .seed(42)
//!     .build();
//! let stream = load_dataset(&catalog, config)?; // infinite
//! for batch in stream.take(steps) {
//!     let batch = batch?; // labels [128, 10] one-hot
//! }
//! ```
//!
//! # Thread Safety
//! - Worker threads share the dataset and the preprocessing pipeline via `Arc`
//! - Every batch re-seeds the preparing thread's RNG from the batch index, so
//!   seeded streams are identical with any number of workers
//! - Dropping a `BatchStream` stops the feeder and joins every worker

mod common;
mod config;
mod loader;
mod pipeline;
mod stream;
mod workers;

pub use common::thread::{
    clear_worker_rng, init_worker_rng, with_worker_rng, worker_gen_bool, worker_gen_range,
    WORKER_ID, WORKER_RNG,
};
pub use config::{LoaderConfig, LoaderConfigBuilder, TrainCarveOut};
pub use loader::{load_dataset, resolve_split, LEGACY_TRAIN_PERCENT};
pub use stream::BatchStream;
