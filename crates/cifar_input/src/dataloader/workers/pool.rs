//! Worker pool for parallel batch preparation.
//!
//! Workers pull tasks from a single bounded queue and push results into a
//! bounded output queue. Ordering and seeding are handled one level up (every
//! task carries its batch index), so any worker may pick up any task.
//!
//! # Key features
//! - Bounded channels prevent memory bloat
//! - Graceful shutdown on drop
//! - Thread-local worker IDs for debugging

use anyhow::{ensure, Context, Result};
use crossbeam_channel::{bounded, Receiver, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use crate::dataloader::common::thread::WORKER_ID;

/// Thread pool for parallel data loading.
///
/// Manages worker lifecycle and communication through bounded channels:
/// - Task channel: producer -> Workers (work distribution)
/// - Output channel: Workers -> consumer (result collection)
/// - Shutdown flag: Enables graceful termination
///
/// Workers must poll the shutdown flag while blocked on either channel,
/// otherwise `drop` cannot join them.
pub(crate) struct WorkerPool<Task, Output> {
    workers: Vec<thread::JoinHandle<()>>,
    task_tx: Option<Sender<Task>>,
    output_rx: Receiver<Output>,
    shutdown: Arc<AtomicBool>,
}

impl<Task, Output> WorkerPool<Task, Output>
where
    Task: Send + 'static,
    Output: Send + 'static,
{
    /// Spawns `num_workers` threads named `dataloader-worker-{id}`, each
    /// running `worker_fn` until the task queue closes or shutdown is set.
    pub(crate) fn new<F>(num_workers: usize, buffer_size: usize, worker_fn: F) -> Result<Self>
    where
        F: Fn(Receiver<Task>, Sender<Output>, Arc<AtomicBool>) + Send + Sync + 'static,
    {
        ensure!(
            num_workers > 0,
            "Cannot create WorkerPool with 0 workers. \
             Either set num_workers > 0 or use single-threaded mode."
        );
        ensure!(
            buffer_size > 0,
            "Cannot create WorkerPool with buffer_size 0. \
             Buffer size must be > 0 to prevent deadlocks."
        );

        let (task_tx, task_rx) = bounded(buffer_size);
        let (output_tx, output_rx) = bounded(buffer_size);

        let shutdown = Arc::new(AtomicBool::new(false));
        let worker_fn = Arc::new(worker_fn);
        let mut pool = Self {
            workers: Vec::with_capacity(num_workers),
            task_tx: Some(task_tx),
            output_rx,
            shutdown,
        };

        for worker_id in 0..num_workers {
            let task_rx = task_rx.clone();
            let output_tx = output_tx.clone();
            let shutdown = pool.shutdown.clone();
            let worker_fn = worker_fn.clone();

            // On spawn failure `pool` drops here, which stops the workers
            // already running.
            let handle = thread::Builder::new()
                .name(format!("dataloader-worker-{}", worker_id))
                .spawn(move || {
                    WORKER_ID.with(|id| *id.borrow_mut() = worker_id);
                    worker_fn(task_rx, output_tx, shutdown);
                })
                .with_context(|| format!("Failed to spawn worker thread {}", worker_id))?;

            pool.workers.push(handle);
        }

        Ok(pool)
    }

    pub(crate) fn num_workers(&self) -> usize {
        self.workers.len()
    }

    /// A new handle on the task queue. The queue closes once the pool and
    /// every handle are dropped.
    pub(crate) fn task_sender(&self) -> Option<Sender<Task>> {
        self.task_tx.clone()
    }

    pub(crate) fn output(&self) -> &Receiver<Output> {
        &self.output_rx
    }

    pub(crate) fn shutdown_flag(&self) -> Arc<AtomicBool> {
        self.shutdown.clone()
    }
}

impl<Task, Output> Drop for WorkerPool<Task, Output> {
    fn drop(&mut self) {
        // Signal shutdown to all workers
        self.shutdown.store(true, Ordering::Relaxed);

        // Drop the task sender so idle workers see a closed queue
        self.task_tx.take();

        // Wait for workers to finish
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}
