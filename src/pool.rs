//! Fixed-size worker pool running one stage over partitioned input.
//!
//! # Concurrency Model
//!
//! - The input is split with [`partition`] into at most `ceiling` contiguous slices
//! - Each slice is processed sequentially by its own Tokio task
//! - Each task returns its partial results, which are written into a pre-sized
//!   slot vector at the worker's index
//! - Slots are concatenated in index order once every worker has finished, so
//!   the output follows input order regardless of completion order
//!
//! Workers share nothing mutable; the stage and the input are shared read-only
//! through [`Arc`].

use std::sync::Arc;

use thiserror::Error;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::partition::{Partition, partition};
use crate::stage::{Stage, StageKind};

/// Errors from running a worker pool.
#[derive(Debug, Error)]
pub enum PoolError {
    /// A worker task panicked; its partition produced no results.
    #[error("{stage} worker {worker} panicked")]
    WorkerPanicked { stage: StageKind, worker: usize },

    /// The cancellation token fired before all items were processed.
    #[error("{stage} stage cancelled")]
    Cancelled { stage: StageKind },
}

impl PoolError {
    /// Returns true when the pool stopped because of cancellation.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

/// How a single worker finished.
enum WorkerExit<T> {
    Done(Vec<T>),
    Cancelled,
}

/// Runs stages over partitioned input with a fixed worker ceiling.
#[derive(Debug, Clone, Copy)]
pub struct WorkerPool {
    ceiling: usize,
}

impl WorkerPool {
    /// Creates a pool that spawns at most `ceiling` workers (at least one).
    #[must_use]
    pub fn new(ceiling: usize) -> Self {
        Self {
            ceiling: ceiling.max(1),
        }
    }

    /// Returns the worker ceiling.
    #[must_use]
    pub fn ceiling(&self) -> usize {
        self.ceiling
    }

    /// Processes every item of `input` with `stage` and returns the non-empty
    /// results in input order.
    ///
    /// Items whose processing degrades (`Ok(None)`, or a non-cancellation
    /// error) contribute nothing. Always waits for every worker before
    /// returning.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::Cancelled`] if `cancel` fired while workers were
    /// running, or [`PoolError::WorkerPanicked`] if a worker task panicked.
    #[instrument(skip_all, fields(stage = %stage.kind(), items = input.len(), ceiling = self.ceiling))]
    pub async fn run<S: Stage>(
        &self,
        stage: Arc<S>,
        input: Arc<[S::Item]>,
        cancel: &CancellationToken,
    ) -> Result<Vec<S::Output>, PoolError> {
        let kind = stage.kind();
        let partitions = partition(input.len(), self.ceiling);
        if partitions.is_empty() {
            debug!("nothing to do");
            return Ok(Vec::new());
        }
        info!(workers = partitions.len(), "starting workers");

        let mut workers = JoinSet::new();
        let mut worker_by_task = std::collections::HashMap::with_capacity(partitions.len());
        for (index, slice) in partitions.iter().copied().enumerate() {
            let stage = Arc::clone(&stage);
            let input = Arc::clone(&input);
            let cancel = cancel.clone();
            let handle = workers.spawn(async move {
                (index, run_worker(&*stage, &input, slice, index, &cancel).await)
            });
            worker_by_task.insert(handle.id(), index);
        }

        let mut slots: Vec<Option<Vec<S::Output>>> = (0..partitions.len()).map(|_| None).collect();
        let mut cancelled = false;
        let mut panicked = None;

        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok((index, WorkerExit::Done(results))) => {
                    debug!(worker = index, results = results.len(), "worker finished");
                    slots[index] = Some(results);
                }
                Ok((index, WorkerExit::Cancelled)) => {
                    debug!(worker = index, "worker cancelled");
                    cancelled = true;
                }
                Err(error) => {
                    let worker = worker_by_task.get(&error.id()).copied().unwrap_or_default();
                    warn!(worker, error = %error, "worker task panicked");
                    panicked.get_or_insert(worker);
                }
            }
        }

        if cancelled || cancel.is_cancelled() {
            return Err(PoolError::Cancelled { stage: kind });
        }
        if let Some(worker) = panicked {
            return Err(PoolError::WorkerPanicked {
                stage: kind,
                worker,
            });
        }

        let results: Vec<S::Output> = slots.into_iter().flatten().flatten().collect();
        info!(results = results.len(), "workers finished");
        Ok(results)
    }
}

async fn run_worker<S: Stage>(
    stage: &S,
    input: &[S::Item],
    slice: Partition,
    index: usize,
    cancel: &CancellationToken,
) -> WorkerExit<S::Output> {
    let mut results = Vec::with_capacity(slice.len);
    for item in &input[slice.range()] {
        if cancel.is_cancelled() {
            return WorkerExit::Cancelled;
        }
        match stage.process_item(item, cancel).await {
            Ok(Some(output)) => results.push(output),
            Ok(None) => {}
            Err(error) if error.is_cancelled() => return WorkerExit::Cancelled,
            Err(error) => {
                warn!(worker = index, error = %error, "item failed; skipped");
            }
        }
    }
    WorkerExit::Done(results)
}
