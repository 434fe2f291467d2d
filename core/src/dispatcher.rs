//! Task dispatcher abstraction for fire-and-forget background work.
//!
//! Some domain operations have follow-up work that must not run inside the
//! request: sending a confirmation email after a conference is created,
//! recomputing the featured speaker after a session is added. These are
//! described as [`Task`]s and handed to a [`TaskDispatcher`] once the
//! triggering write has committed.
//!
//! # Key Principles
//!
//! - **Commit first**: tasks are enqueued after the entity write commits,
//!   never before, so a task never refers to data that was rolled back
//! - **Fire and forget**: the request does not wait for the task to run
//! - **At-least-once**: handlers must tolerate duplicate delivery

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Errors that can occur while enqueuing a task.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// The queue could not be reached
    #[error("Task queue unavailable: {0}")]
    QueueUnavailable(String),

    /// The queue refused the task
    #[error("Task '{task}' rejected: {reason}")]
    Rejected {
        /// Name of the rejected task
        task: String,
        /// Reason given by the queue
        reason: String,
    },
}

/// A unit of background work.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Handler name (for example `send_confirmation_email`)
    pub name: String,
    /// String parameters for the handler
    pub params: BTreeMap<String, String>,
    /// When the task was enqueued
    pub enqueued_at: DateTime<Utc>,
}

impl Task {
    /// Create a task with no parameters.
    #[must_use]
    pub fn new(name: impl Into<String>, enqueued_at: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            params: BTreeMap::new(),
            enqueued_at,
        }
    }

    /// Add a parameter.
    #[must_use]
    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }
}

/// Queue for background tasks.
///
/// Uses explicit `Pin<Box<dyn Future>>` returns so it can be shared as
/// `Arc<dyn TaskDispatcher>` and captured by effects.
pub trait TaskDispatcher: Send + Sync {
    /// Enqueue a task.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError`] if the task could not be enqueued.
    fn dispatch(
        &self,
        task: Task,
    ) -> Pin<Box<dyn Future<Output = Result<(), DispatchError>> + Send + '_>>;
}
