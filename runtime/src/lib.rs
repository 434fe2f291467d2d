//! # Conference Runtime
//!
//! Runtime support for the conference service.
//!
//! This crate provides the imperative shell around the pure pieces in
//! `conference-core`: retrying contended transactions, executing post-commit
//! effects, an in-process cache, and Prometheus metrics.
//!
//! ## Core Components
//!
//! - **Retry**: capped exponential backoff with jitter for optimistic
//!   transactions
//! - **Effect Executor**: runs effect descriptions after commit and collects
//!   the actions they produce
//! - **Memory Cache**: process-wide `CacheService` implementation
//! - **Metrics**: recorder structs and the Prometheus exporter
//!
//! ## Example
//!
//! ```ignore
//! use conference_runtime::{effects, retry::{RetryPolicy, retry_with_predicate}};
//!
//! let post_commit = retry_with_predicate(
//!     RetryPolicy::default(),
//!     || attempt(store.clone()),
//!     ConferenceError::is_retryable,
//! )
//! .await?;
//!
//! effects::execute_all(post_commit).await;
//! ```

/// Retry logic with exponential backoff
pub mod retry;

/// Post-commit effect execution
pub mod effects;

/// In-process cache
pub mod cache;

/// Prometheus metrics for observability
pub mod metrics;

pub use cache::MemoryCache;
pub use retry::{RetryPolicy, retry_with_backoff, retry_with_predicate};
