//! Task dispatcher that records instead of enqueuing.

use conference_core::dispatcher::{DispatchError, Task, TaskDispatcher};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

/// Records every dispatched task for later assertions.
///
/// Can be told to reject the next `n` dispatches to exercise the
/// post-commit retry path.
#[derive(Debug, Default)]
pub struct RecordingDispatcher {
    tasks: Mutex<Vec<Task>>,
    reject_next: AtomicUsize,
}

impl RecordingDispatcher {
    /// Create an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject the next `n` dispatches with `QueueUnavailable`.
    pub fn reject_next(&self, n: usize) {
        self.reject_next.store(n, Ordering::SeqCst);
    }

    /// Every task accepted so far, in dispatch order.
    #[must_use]
    pub fn tasks(&self) -> Vec<Task> {
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Accepted tasks with the given handler name.
    #[must_use]
    pub fn tasks_named(&self, name: &str) -> Vec<Task> {
        self.tasks()
            .into_iter()
            .filter(|task| task.name == name)
            .collect()
    }
}

impl TaskDispatcher for RecordingDispatcher {
    fn dispatch(
        &self,
        task: Task,
    ) -> Pin<Box<dyn Future<Output = Result<(), DispatchError>> + Send + '_>> {
        Box::pin(async move {
            let rejected = self
                .reject_next
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if rejected {
                return Err(DispatchError::QueueUnavailable(format!(
                    "rejected {}",
                    task.name
                )));
            }

            tracing::debug!(task = %task.name, "Recorded task");
            self.tasks
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(task);
            Ok(())
        })
    }
}
