//! Entity store trait and related types.
//!
//! This module defines the abstraction over the document store that backs the
//! conference domain: keyed get/put, id allocation, get-or-insert, filtered
//! queries, and optimistic multi-entity commits.
//!
//! # Optimistic Concurrency
//!
//! Every stored entity carries a [`Version`]. A transaction records the
//! version of each entity it reads and submits those expectations together
//! with its writes in a [`ChangeSet`]. The store applies the change set
//! atomically, or rejects all of it with
//! [`StoreError::ConcurrencyConflict`] if any expectation no longer holds.
//! Callers treat that error as retryable and re-run the whole
//! read-modify-write sequence.
//!
//! # Implementations
//!
//! - `InMemoryEntityStore` (in `conference-testing`): fast, deterministic,
//!   with fault injection for exercising retry paths
//!
//! # Example
//!
//! ```no_run
//! use conference_core::entity_store::{EntityStore, StoreError};
//! use conference_core::key::EntityKey;
//!
//! async fn example<S: EntityStore>(store: &S) -> Result<(), StoreError> {
//!     let key = EntityKey::named("Profile", "alice");
//!     if let Some(found) = store.get(key).await? {
//!         println!("{} at version {}", found.document.key(), found.version);
//!     }
//!     Ok(())
//! }
//! ```

use crate::entity::Document;
use crate::key::{EntityKey, Version};
use crate::query::Query;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Boxed future returned by [`EntityStore`] methods.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

/// Errors that can occur during entity store operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Optimistic concurrency conflict: an entity read by the transaction
    /// was modified (or created) before the transaction committed.
    #[error("Concurrency conflict on {key}: expected version {expected:?}, found {actual:?}")]
    ConcurrencyConflict {
        /// The entity whose version moved.
        key: EntityKey,
        /// Version observed by the transaction (`None` = did not exist).
        expected: Option<Version>,
        /// Version currently stored (`None` = does not exist).
        actual: Option<Version>,
    },

    /// The store could not be reached or rejected the operation.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// Database-level failure.
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl StoreError {
    /// True if re-running the transaction may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::ConcurrencyConflict { .. })
    }
}

/// A document together with the version it was read at.
#[derive(Clone, Debug, PartialEq)]
pub struct Versioned {
    /// The stored document.
    pub document: Document,
    /// The version the document was read at.
    pub version: Version,
}

/// The read set and write set of a transaction.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ChangeSet {
    /// Every key the transaction read, with the version it observed.
    /// `None` means the entity did not exist when read.
    pub reads: Vec<(EntityKey, Option<Version>)>,
    /// Documents to write. Written keys that were never read are blind writes.
    pub writes: Vec<Document>,
}

/// Entity store abstraction.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync` so a single store can be shared by
/// every request handler.
///
/// # Dyn Compatibility
///
/// Methods return boxed futures instead of using `async fn` so the trait can
/// be used as `Arc<dyn EntityStore>`.
pub trait EntityStore: Send + Sync {
    /// Load a single entity.
    ///
    /// Returns `Ok(None)` if nothing is stored under `key`.
    ///
    /// # Errors
    ///
    /// - `Unavailable` / `DatabaseError`: the store could not serve the read
    fn get(&self, key: EntityKey) -> StoreFuture<'_, Option<Versioned>>;

    /// Write a single document outside of any transaction (last writer wins).
    ///
    /// Returns the new version.
    ///
    /// # Errors
    ///
    /// - `Unavailable` / `DatabaseError`: the write was not applied
    fn put(&self, document: Document) -> StoreFuture<'_, Version>;

    /// Atomically validate the read set and apply the write set.
    ///
    /// # Errors
    ///
    /// - `ConcurrencyConflict`: some read version no longer matches; nothing
    ///   was written
    /// - `Unavailable` / `DatabaseError`: nothing was written
    fn commit(&self, changes: ChangeSet) -> StoreFuture<'_, ()>;

    /// Allocate a fresh numeric key of `kind` under an optional parent.
    ///
    /// # Errors
    ///
    /// - `Unavailable` / `DatabaseError`: allocation failed
    fn allocate_key(&self, kind: String, parent: Option<EntityKey>) -> StoreFuture<'_, EntityKey>;

    /// Return the document stored under `document.key()`, inserting
    /// `document` first if the key is vacant. Atomic with respect to
    /// concurrent callers: exactly one insert wins.
    ///
    /// # Errors
    ///
    /// - `Unavailable` / `DatabaseError`: the operation was not applied
    fn get_or_insert(&self, document: Document) -> StoreFuture<'_, Document>;

    /// Run a filtered, ordered query over one kind.
    ///
    /// # Errors
    ///
    /// - `Unavailable` / `DatabaseError`: the query could not run
    fn query(&self, query: Query) -> StoreFuture<'_, Vec<Document>>;
}
