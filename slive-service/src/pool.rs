//! Bounded task pool backing asynchronous execution.
//!
//! [`WorkerPool`] caps the number of operations running at once using a tokio semaphore. Tasks
//! beyond the limit are queued until a permit frees up. A [`TaskTracker`] keeps count of spawned
//! tasks so that [`WorkerPool::join`] resolves once every accepted task has finished.

use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;

use crate::error::ExecutorError;

/// Limits concurrently running tasks and tracks their completion.
#[derive(Clone, Debug)]
pub(crate) struct WorkerPool {
    semaphore: Arc<Semaphore>,
    tracker: TaskTracker,
    /// Held while accepting a task and while shutting down, so that no task is accepted once
    /// [`join`](Self::join) may have started waiting.
    shut_down: Arc<Mutex<bool>>,
}

impl WorkerPool {
    /// Creates a pool running at most `size` tasks at once. A size of zero is raised to one.
    pub(crate) fn new(size: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(size.max(1))),
            tracker: TaskTracker::new(),
            shut_down: Arc::new(Mutex::new(false)),
        }
    }

    /// Queues a task on the pool.
    ///
    /// Returns [`ExecutorError::ShutDown`] once [`shutdown`](Self::shutdown) has been called.
    pub(crate) fn spawn<F>(&self, future: F) -> Result<JoinHandle<F::Output>, ExecutorError>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let shut_down = self.shut_down.lock().unwrap_or_else(PoisonError::into_inner);
        if *shut_down {
            return Err(ExecutorError::ShutDown);
        }

        let semaphore = Arc::clone(&self.semaphore);
        Ok(self.tracker.spawn(async move {
            // The semaphore is never closed, so acquiring only fails if that changes.
            let _permit = semaphore.acquire_owned().await.ok();
            future.await
        }))
    }

    /// Stops accepting new tasks. Queued and running tasks still complete.
    ///
    /// Returns `true` for the call that actually shut the pool down, and `false` for all
    /// subsequent calls.
    pub(crate) fn shutdown(&self) -> bool {
        let mut shut_down = self.shut_down.lock().unwrap_or_else(PoisonError::into_inner);
        if *shut_down {
            return false;
        }
        *shut_down = true;
        self.tracker.close();
        true
    }

    pub(crate) fn is_shut_down(&self) -> bool {
        *self.shut_down.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Shuts the pool down and waits until all accepted tasks have finished.
    pub(crate) async fn join(&self) {
        self.shutdown();
        self.tracker.wait().await;
    }

    /// Returns the number of accepted tasks that have not finished yet.
    pub(crate) fn pending(&self) -> usize {
        self.tracker.len()
    }
}
