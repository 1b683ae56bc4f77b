//! Bounded fan-out/fan-in over a set of work units.
//!
//! A [`WorkerPool`] keeps at most `width` units spawned at a time and every
//! unit holds one permit of a semaphore for as long as it runs. Clones share
//! the semaphore, so several pools driven concurrently from the same cycle
//! still respect one global ceiling.

use std::{
    future::Future,
    sync::Arc,
};
use tokio::{
    sync::Semaphore,
    task::JoinSet,
};
use tokio_util::sync::CancellationToken;
use tracing::error;

/// Results of one [`WorkerPool::run`].
#[derive(Debug)]
pub struct PoolOutcome<T, E> {
    /// Units that completed successfully, in completion order.
    pub completed: Vec<T>,
    /// Units that returned an error.
    pub failed: Vec<E>,
    /// Units that were abandoned or never started because of cancellation.
    pub cancelled: usize,
    /// Units whose task panicked.
    pub panicked: usize,
}

impl<T, E> Default for PoolOutcome<T, E> {
    fn default() -> Self {
        Self {
            completed: Vec::new(),
            failed: Vec::new(),
            cancelled: 0,
            panicked: 0,
        }
    }
}

enum UnitResult<T, E> {
    Done(Result<T, E>),
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    width: usize,
    cancel: CancellationToken,
}

impl WorkerPool {
    /// `max_concurrent` is clamped to at least one.
    pub fn new(max_concurrent: usize, cancel: CancellationToken) -> Self {
        let width = max_concurrent.max(1);
        Self {
            permits: Arc::new(Semaphore::new(width)),
            width,
            cancel,
        }
    }

    /// Runs `work` once per input and waits until every dispatched unit has
    /// finished.
    ///
    /// On cancellation no new units are dispatched, in-flight units are
    /// dropped at their next suspension point, and whatever already completed
    /// is returned.
    pub async fn run<I, F, Fut, T, E>(&self, inputs: I, work: F) -> PoolOutcome<T, E>
    where
        I: IntoIterator,
        F: Fn(I::Item) -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        let mut inputs = inputs.into_iter();
        let mut tasks = JoinSet::new();
        let mut outcome = PoolOutcome::default();

        loop {
            while tasks.len() < self.width && !self.cancel.is_cancelled() {
                let Some(input) = inputs.next() else {
                    break;
                };
                let unit = work(input);
                let permits = self.permits.clone();
                let cancel = self.cancel.clone();

                tasks.spawn(async move {
                    let _permit = tokio::select! {
                        biased;
                        () = cancel.cancelled() => return UnitResult::Cancelled,
                        permit = permits.acquire_owned() => match permit {
                            Ok(permit) => permit,
                            Err(_closed) => return UnitResult::Cancelled,
                        },
                    };

                    tokio::select! {
                        biased;
                        () = cancel.cancelled() => UnitResult::Cancelled,
                        result = unit => UnitResult::Done(result),
                    }
                });
            }

            let Some(joined) = tasks.join_next().await else {
                break;
            };

            match joined {
                Ok(UnitResult::Done(Ok(value))) => outcome.completed.push(value),
                Ok(UnitResult::Done(Err(err))) => outcome.failed.push(err),
                Ok(UnitResult::Cancelled) => outcome.cancelled += 1,
                Err(err) => {
                    error!(error = ?err, "Worker pool unit panicked");
                    outcome.panicked += 1;
                }
            }
        }

        // inputs left over after cancellation were never dispatched
        outcome.cancelled += inputs.count();
        outcome
    }
}
