//! Worker management for parallel batch preparation.
//!
//! - `pool`: Worker pool implementation
//!
//! A feeder thread turns the batch sampler into `BatchTask`s; workers turn
//! tasks into `(batch_index, Result<Batch>)` pairs. Both sides block with a
//! timeout and re-check the shutdown flag, so dropping the stream never
//! leaves a thread parked on a full or empty channel.

pub(crate) mod pool;

use anyhow::{Context, Result};
use crossbeam_channel::{Receiver, RecvTimeoutError, SendTimeoutError, Sender};
use log::debug;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use super::common::thread::{clear_worker_rng, WORKER_ID};
use super::pipeline::BatchPipeline;
use crate::batch::Batch;

/// One mini-batch worth of dataset indices.
#[derive(Debug)]
pub(crate) struct BatchTask {
    /// Position of the batch in the stream, used for ordering and seeding
    pub(crate) batch_index: usize,
    pub(crate) indices: Vec<usize>,
}

pub(crate) type BatchOutput = (usize, Result<Batch>);

/// Sends `value`, giving up once `shutdown` is set or the receiver is gone.
/// Returns whether the value was delivered.
pub(crate) fn send_until_shutdown<T>(
    tx: &Sender<T>,
    mut value: T,
    shutdown: &AtomicBool,
    poll: Duration,
) -> bool {
    loop {
        if shutdown.load(Ordering::Relaxed) {
            return false;
        }
        match tx.send_timeout(value, poll) {
            Ok(()) => return true,
            Err(SendTimeoutError::Timeout(returned)) => value = returned,
            Err(SendTimeoutError::Disconnected(_)) => return false,
        }
    }
}

/// Worker loop: prepare batches until the task queue closes or shutdown.
pub(crate) fn run_worker(
    pipeline: &BatchPipeline,
    task_rx: Receiver<BatchTask>,
    output_tx: Sender<BatchOutput>,
    shutdown: &AtomicBool,
    poll: Duration,
) {
    let worker_id = WORKER_ID.with(|id| *id.borrow());
    debug!("Worker {} started", worker_id);

    while !shutdown.load(Ordering::Relaxed) {
        let task = match task_rx.recv_timeout(poll) {
            Ok(task) => task,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };

        let result = pipeline
            .process(task.batch_index, &task.indices)
            .with_context(|| format!("Worker {} failed", worker_id));

        if !send_until_shutdown(&output_tx, (task.batch_index, result), shutdown, poll) {
            break;
        }
    }

    clear_worker_rng();
    debug!("Worker {} stopped", worker_id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::bounded;

    #[test]
    fn test_send_until_shutdown() {
        let (tx, rx) = bounded(1);
        let shutdown = AtomicBool::new(false);
        let poll = Duration::from_millis(5);

        assert!(send_until_shutdown(&tx, 1, &shutdown, poll));

        // Channel full: gives up as soon as shutdown is observed
        shutdown.store(true, Ordering::Relaxed);
        assert!(!send_until_shutdown(&tx, 2, &shutdown, poll));
        assert_eq!(rx.try_recv().ok(), Some(1));

        // Receiver gone
        shutdown.store(false, Ordering::Relaxed);
        drop(rx);
        assert!(!send_until_shutdown(&tx, 3, &shutdown, poll));
    }
}
