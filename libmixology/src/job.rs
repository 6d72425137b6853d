//! Conflated job controller
//!
//! Holds at most one unit of cancellable work. Launching a new unit aborts
//! the previous one, and the new unit does not start running until the
//! previous one has actually stopped, so two units never overlap.
//!
//! Typical use is search-as-you-type: every keystroke launches a delayed
//! search and the pending one is dropped.

use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::task::JoinHandle;

use crate::machine::Scope;

#[derive(Debug, Default)]
pub struct ConflatedJob {
    current: Mutex<Option<JoinHandle<()>>>,
}

impl ConflatedJob {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel the current unit (if any) and start `future` in `scope`
    pub fn launch<F>(&self, scope: &Scope, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut current = self.lock();
        let previous = current.take();
        if let Some(previous) = &previous {
            previous.abort();
        }

        let handle = scope.spawn(async move {
            if let Some(previous) = previous {
                // Resolves once the aborted unit has been dropped
                let _ = previous.await;
            }
            future.await;
        });
        *current = Some(handle);
    }

    /// True while the current unit has neither finished nor been cancelled
    pub fn is_active(&self) -> bool {
        self.lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    pub fn cancel(&self) {
        if let Some(handle) = self.lock().take() {
            handle.abort();
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for ConflatedJob {
    fn drop(&mut self) {
        self.cancel();
    }
}
