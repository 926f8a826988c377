//! Per-thread concurrency control.
//!
//! At most one turn runs on a provider thread at a time.  A second turn
//! waits a bounded time for the first to settle and then gives up with
//! [`ThreadBusy`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Manages per-thread run locks.
///
/// Each thread id maps to a `Semaphore(1)`.  The permit is held by the
/// turn task and released on drop when the turn settles.
pub struct ThreadLockMap {
    locks: Mutex<HashMap<String, Arc<Semaphore>>>,
}

impl Default for ThreadLockMap {
    fn default() -> Self {
        Self::new()
    }
}

impl ThreadLockMap {
    pub fn new() -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Acquire the run lock for a thread, waiting at most `wait`.
    pub async fn acquire(
        &self,
        thread_id: &str,
        wait: Duration,
    ) -> Result<OwnedSemaphorePermit, ThreadBusy> {
        let sem = {
            let mut locks = self.locks.lock();
            locks
                .entry(thread_id.to_owned())
                .or_insert_with(|| Arc::new(Semaphore::new(1)))
                .clone()
        };

        if let Ok(permit) = sem.clone().try_acquire_owned() {
            return Ok(permit);
        }

        tracing::debug!(thread_id, wait_ms = wait.as_millis() as u64, "thread busy, waiting");
        match tokio::time::timeout(wait, sem.acquire_owned()).await {
            Ok(Ok(permit)) => Ok(permit),
            _ => Err(ThreadBusy),
        }
    }

    /// Number of tracked threads.
    pub fn thread_count(&self) -> usize {
        self.locks.lock().len()
    }

    /// Drop locks nobody holds or waits on.
    pub fn prune_idle(&self) {
        let mut locks = self.locks.lock();
        // Permits and pending acquires each hold a clone of the Arc.
        locks.retain(|_, sem| Arc::strong_count(sem) > 1);
    }
}

/// A turn is already running on this thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreadBusy;

impl std::fmt::Display for ThreadBusy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "a response is already being generated for this thread")
    }
}

impl std::error::Error for ThreadBusy {}
