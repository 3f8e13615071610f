//! src/dataloader/stream.rs
//!
//! `BatchStream`: the iterator returned by `load_dataset`.
//!
//! Two execution modes:
//! - **Single-threaded** (`num_workers == 0`): each `next()` prepares one
//!   batch on the caller thread. No prefetching.
//! - **Prefetched** (`num_workers > 0`): a feeder thread sends index batches
//!   to a `WorkerPool`; finished batches are buffered in a bounded channel
//!   and handed out in batch order through a small reorder buffer.

use anyhow::{anyhow, Context, Result};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use log::debug;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use super::pipeline::BatchPipeline;
use super::workers::pool::WorkerPool;
use super::workers::{run_worker, send_until_shutdown, BatchOutput, BatchTask};
use crate::batch::Batch;
use crate::catalog::{DatasetInfo, SplitSpec};
use crate::config::MixupCoeff;

/// Owned stream of mini-batch indices.
pub(crate) type IndexBatches = Box<dyn Iterator<Item = Vec<usize>> + Send>;

/// Everything `BatchStream` reports about itself besides the batches.
#[derive(Debug, Clone)]
pub(crate) struct StreamInfo {
    pub(crate) dataset: DatasetInfo,
    pub(crate) split: SplitSpec,
    pub(crate) num_examples: usize,
    pub(crate) num_batches: Option<usize>,
    pub(crate) mixup_coeff: Option<MixupCoeff>,
}

/// Iterator over preprocessed `Batch`es.
///
/// Infinite for the training split, one pass for evaluation splits. A stream
/// cannot be restarted; call `load_dataset` again for a fresh one. Dropping
/// the stream stops and joins its threads.
///
/// Errors while preparing a batch are yielded as `Err` items and do not end
/// the stream.
pub struct BatchStream {
    mode: StreamMode,
    info: StreamInfo,
    next_index: usize,
}

enum StreamMode {
    Single {
        pipeline: Arc<BatchPipeline>,
        batches: IndexBatches,
    },
    Prefetched(Prefetcher),
}

impl BatchStream {
    pub(crate) fn single(pipeline: Arc<BatchPipeline>, batches: IndexBatches, info: StreamInfo) -> Self {
        Self {
            mode: StreamMode::Single { pipeline, batches },
            info,
            next_index: 0,
        }
    }

    pub(crate) fn prefetched(
        pipeline: Arc<BatchPipeline>,
        batches: IndexBatches,
        info: StreamInfo,
        num_workers: usize,
        prefetch_factor: usize,
        timeout: Duration,
        worker_timeout: Duration,
    ) -> Result<Self> {
        let prefetcher = Prefetcher::spawn(
            pipeline,
            batches,
            num_workers,
            prefetch_factor,
            timeout,
            worker_timeout,
        )?;
        Ok(Self {
            mode: StreamMode::Prefetched(prefetcher),
            info,
            next_index: 0,
        })
    }

    /// Mixup coefficients resolved for this stream; feed them (updated) into
    /// the next `load_dataset` call.
    pub fn mixup_coeff(&self) -> Option<&MixupCoeff> {
        self.info.mixup_coeff.as_ref()
    }

    pub fn dataset_info(&self) -> &DatasetInfo {
        &self.info.dataset
    }

    /// The split actually read, e.g. `train[:95%]`.
    pub fn split(&self) -> &SplitSpec {
        &self.info.split
    }

    /// Number of examples in the resolved split.
    pub fn num_examples(&self) -> usize {
        self.info.num_examples
    }

    /// Number of batches in one pass, `None` for an infinite stream.
    pub fn num_batches(&self) -> Option<usize> {
        self.info.num_batches
    }

    pub fn is_infinite(&self) -> bool {
        self.info.num_batches.is_none()
    }

    fn exhausted(&self) -> bool {
        self.info
            .num_batches
            .is_some_and(|total| self.next_index >= total)
    }
}

impl Iterator for BatchStream {
    type Item = Result<Batch>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.exhausted() {
            return None;
        }
        let batch_index = self.next_index;
        let item = match &mut self.mode {
            StreamMode::Single { pipeline, batches } => {
                let indices = batches.next()?;
                pipeline.process(batch_index, &indices)
            }
            StreamMode::Prefetched(prefetcher) => prefetcher.receive(batch_index)?,
        };
        self.next_index += 1;
        Some(item)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match self.info.num_batches {
            Some(total) => {
                let remaining = total.saturating_sub(self.next_index);
                (remaining, Some(remaining))
            }
            None => (usize::MAX, None),
        }
    }
}

impl std::fmt::Debug for BatchStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mode = match &self.mode {
            StreamMode::Single { .. } => "single".to_string(),
            StreamMode::Prefetched(p) => format!("prefetched({} workers)", p.pool.num_workers()),
        };
        f.debug_struct("BatchStream")
            .field("mode", &mode)
            .field("split", &self.info.split.to_string())
            .field("num_batches", &self.info.num_batches)
            .field("next_index", &self.next_index)
            .finish()
    }
}

// ============================================================================
// Prefetcher
// ============================================================================

struct Prefetcher {
    pool: WorkerPool<BatchTask, BatchOutput>,
    feeder: Option<thread::JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
    /// Batches that arrived ahead of their turn
    pending: BTreeMap<usize, Result<Batch>>,
    timeout: Duration,
    disconnected: bool,
}

impl Prefetcher {
    fn spawn(
        pipeline: Arc<BatchPipeline>,
        batches: IndexBatches,
        num_workers: usize,
        prefetch_factor: usize,
        timeout: Duration,
        worker_timeout: Duration,
    ) -> Result<Self> {
        let buffer_size = prefetch_factor * num_workers;
        let worker = move |task_rx: Receiver<BatchTask>,
                           output_tx: Sender<BatchOutput>,
                           shutdown: Arc<AtomicBool>| {
            run_worker(&pipeline, task_rx, output_tx, &shutdown, worker_timeout)
        };
        let pool = WorkerPool::new(num_workers, buffer_size, worker)?;

        let shutdown = pool.shutdown_flag();
        let task_tx = pool
            .task_sender()
            .context("Worker task queue closed before the feeder started")?;
        let feeder_shutdown = shutdown.clone();
        let feeder = thread::Builder::new()
            .name("dataloader-feeder".to_string())
            .spawn(move || {
                let mut sent = 0;
                for (batch_index, indices) in batches.enumerate() {
                    let task = BatchTask {
                        batch_index,
                        indices,
                    };
                    if !send_until_shutdown(&task_tx, task, &feeder_shutdown, worker_timeout) {
                        break;
                    }
                    sent += 1;
                }
                debug!("Feeder stopped after {} batches", sent);
            })
            .context("Failed to spawn feeder thread")?;

        debug!(
            "Started {} workers with {} prefetched batches",
            num_workers, buffer_size
        );

        Ok(Self {
            pool,
            feeder: Some(feeder),
            shutdown,
            pending: BTreeMap::new(),
            timeout,
            disconnected: false,
        })
    }

    /// Waits for batch `batch_index`. `None` once every worker has exited
    /// and nothing is left to hand out.
    fn receive(&mut self, batch_index: usize) -> Option<Result<Batch>> {
        loop {
            if let Some(result) = self.pending.remove(&batch_index) {
                return Some(result);
            }
            if self.disconnected {
                return None;
            }
            match self.pool.output().recv_timeout(self.timeout) {
                // Batches are handed out in increasing order, so an index
                // below the awaited one already timed out
                Ok((index, _)) if index < batch_index => {
                    debug!("Dropping batch {} that arrived after its timeout", index);
                }
                Ok((index, result)) => {
                    self.pending.insert(index, result);
                }
                Err(RecvTimeoutError::Timeout) => {
                    return Some(Err(anyhow!(
                        "Worker timeout after {:?} waiting for batch {} - possible deadlock or slow data loading",
                        self.timeout,
                        batch_index
                    )));
                }
                Err(RecvTimeoutError::Disconnected) => {
                    self.disconnected = true;
                    if self.pending.is_empty() {
                        return None;
                    }
                    return Some(Err(anyhow!(
                        "Worker channel disconnected before batch {} - workers may have crashed",
                        batch_index
                    )));
                }
            }
        }
    }
}

impl Drop for Prefetcher {
    fn drop(&mut self) {
        // The pool joins its workers when it drops after this
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(feeder) = self.feeder.take() {
            let _ = feeder.join();
        }
    }
}
