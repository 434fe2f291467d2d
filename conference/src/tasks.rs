//! Background tasks enqueued after commit.
//!
//! Services dispatch only once their write is durable. Dispatch is
//! fire-and-forget: the caller waits for at most one dispatch call, retries
//! run in a background task, and a task that still cannot be enqueued after
//! retries is logged and counted, never surfaced to the caller.
//!
//! [`ChannelDispatcher`] and [`TaskWorker`] provide an in-process queue for
//! the demo binary.

use crate::sessions::SessionService;
use conference_core::dispatcher::{DispatchError, Task, TaskDispatcher};
use conference_core::effect::Effect;
use conference_core::key::EntityKey;
use conference_runtime::effects;
use conference_runtime::metrics::EffectMetrics;
use conference_runtime::retry::{RetryPolicy, retry_with_backoff};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// Confirmation mail to a conference organizer.
pub const SEND_CONFIRMATION_EMAIL: &str = "send_confirmation_email";

/// Featured speaker recomputation for one conference.
pub const FEATURED_SPEAKER: &str = "featured_speaker";

/// What happened to a post-commit dispatch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TaskOutcome {
    /// The queue accepted the task
    Enqueued(String),
    /// Every attempt failed
    Failed {
        /// Task name
        task: String,
        /// Last error
        error: DispatchError,
    },
}

/// An effect that enqueues `task`, retrying with `policy`.
pub fn enqueue(
    dispatcher: Arc<dyn TaskDispatcher>,
    task: Task,
    policy: RetryPolicy,
) -> Effect<TaskOutcome> {
    Effect::future(async move {
        let name = task.name.clone();
        let result = retry_with_backoff(policy, || dispatcher.dispatch(task.clone())).await;
        Some(match result {
            Ok(()) => TaskOutcome::Enqueued(name),
            Err(error) => TaskOutcome::Failed { task: name, error },
        })
    })
}

/// Dispatch `task` once; if that fails, retry with `policy` in the background.
///
/// Returns the handle of the background retries when they were needed.
pub async fn dispatch_after_commit(
    dispatcher: Arc<dyn TaskDispatcher>,
    task: Task,
    policy: RetryPolicy,
) -> Option<JoinHandle<Vec<TaskOutcome>>> {
    match dispatcher.dispatch(task.clone()).await {
        Ok(()) => {
            tracing::debug!(task = %task.name, "Task enqueued");
            None
        },
        Err(error) => {
            tracing::warn!(task = %task.name, %error, "Dispatch failed, retrying in background");
            Some(spawn_post_commit([enqueue(dispatcher, task, policy)]))
        },
    }
}

/// Run post-commit effects on a background task.
pub fn spawn_post_commit<I>(pending: I) -> JoinHandle<Vec<TaskOutcome>>
where
    I: IntoIterator<Item = Effect<TaskOutcome>>,
{
    let pending: Vec<Effect<TaskOutcome>> = pending.into_iter().collect();
    tokio::spawn(run_post_commit(pending))
}

/// Run post-commit effects and log failed dispatches.
pub async fn run_post_commit<I>(pending: I) -> Vec<TaskOutcome>
where
    I: IntoIterator<Item = Effect<TaskOutcome>>,
{
    let outcomes = effects::execute_all(pending).await;
    for outcome in &outcomes {
        match outcome {
            TaskOutcome::Enqueued(task) => tracing::debug!(%task, "Task enqueued"),
            TaskOutcome::Failed { task, error } => {
                EffectMetrics::record_failure();
                tracing::error!(%task, %error, "Task could not be enqueued");
            },
        }
    }
    outcomes
}

// ============================================================================
// In-process queue
// ============================================================================

/// Dispatcher backed by an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelDispatcher {
    sender: mpsc::UnboundedSender<Task>,
}

impl ChannelDispatcher {
    /// Create a dispatcher and the receiving end of its queue.
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Task>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl TaskDispatcher for ChannelDispatcher {
    fn dispatch(
        &self,
        task: Task,
    ) -> Pin<Box<dyn Future<Output = Result<(), DispatchError>> + Send + '_>> {
        Box::pin(async move {
            self.sender
                .send(task)
                .map_err(|err| DispatchError::QueueUnavailable(format!("worker stopped before {}", err.0.name)))
        })
    }
}

/// Drains a [`ChannelDispatcher`] queue.
///
/// `featured_speaker` recomputes the cached featured speaker.
/// `send_confirmation_email` is logged; mail delivery is not part of this
/// service.
#[derive(Debug)]
pub struct TaskWorker {
    sessions: SessionService,
}

impl TaskWorker {
    /// Create a worker.
    #[must_use]
    pub const fn new(sessions: SessionService) -> Self {
        Self { sessions }
    }

    /// Handle tasks until every sender is dropped or `shutdown` fires.
    ///
    /// On shutdown the queue is closed and the tasks already in it are
    /// handled before the worker exits. Resolves to the number of tasks
    /// handled.
    #[must_use]
    pub fn spawn(
        self,
        mut receiver: mpsc::UnboundedReceiver<Task>,
        mut shutdown: oneshot::Receiver<()>,
    ) -> JoinHandle<usize> {
        tokio::spawn(async move {
            let mut handled = 0;
            loop {
                tokio::select! {
                    next = receiver.recv() => match next {
                        Some(task) => {
                            self.handle(&task).await;
                            handled += 1;
                        },
                        None => break,
                    },
                    _ = &mut shutdown => {
                        receiver.close();
                        while let Some(task) = receiver.recv().await {
                            self.handle(&task).await;
                            handled += 1;
                        }
                        break;
                    },
                }
            }
            tracing::debug!(handled, "Task worker stopped");
            handled
        })
    }

    /// Handle one task.
    pub async fn handle(&self, task: &Task) {
        match task.name.as_str() {
            FEATURED_SPEAKER => {
                let Some(token) = task.params.get("conf_key") else {
                    tracing::warn!("featured_speaker task without conf_key");
                    return;
                };
                let key = match EntityKey::from_urlsafe(token) {
                    Ok(key) => key,
                    Err(err) => {
                        tracing::warn!(error = %err, "featured_speaker task with bad key");
                        return;
                    },
                };
                if let Err(err) = self.sessions.recompute_featured_speaker(&key).await {
                    tracing::warn!(conference = %key, error = %err, "Featured speaker refresh failed");
                }
            },
            SEND_CONFIRMATION_EMAIL => {
                let email = task.params.get("email").map_or("", String::as_str);
                tracing::info!(%email, "Conference confirmation ready for delivery");
            },
            other => tracing::warn!(task = %other, "Unknown task"),
        }
    }
}
