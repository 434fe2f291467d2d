//! Optimistic transaction scope over an [`EntityStore`].
//!
//! A [`Transaction`] tracks the version of every entity it reads and buffers
//! every write. Nothing reaches the store until [`Transaction::commit`], which
//! submits the read and write sets as one [`ChangeSet`]. If any entity the
//! transaction read was modified concurrently, the commit fails with a
//! retryable `ConcurrencyConflict` and no write is applied.
//!
//! Because all writes are buffered, a transaction body that only reads and
//! writes through its `Transaction` is safe to re-run from scratch on retry.
//!
//! # Example
//!
//! ```no_run
//! use conference_core::entity::Entity;
//! use conference_core::entity_store::{EntityStore, StoreError};
//! use conference_core::key::EntityKey;
//! use conference_core::transaction::Transaction;
//! use std::sync::Arc;
//!
//! async fn touch<E: Entity + Clone>(
//!     store: Arc<dyn EntityStore>,
//!     key: EntityKey,
//! ) -> Result<bool, StoreError> {
//!     let mut txn = Transaction::begin(store);
//!     let Some(entity) = txn.get::<E>(&key).await? else {
//!         return Ok(false);
//!     };
//!     txn.put(&entity)?;
//!     txn.commit().await?;
//!     Ok(true)
//! }
//! ```

use crate::entity::{Document, Entity};
use crate::entity_store::{ChangeSet, EntityStore, StoreError};
use crate::key::{EntityKey, Version};
use std::collections::HashMap;
use std::sync::Arc;

/// A unit of work spanning one or more entities.
pub struct Transaction {
    store: Arc<dyn EntityStore>,
    reads: HashMap<EntityKey, Option<Version>>,
    read_order: Vec<EntityKey>,
    writes: Vec<Document>,
}

impl Transaction {
    /// Start a new transaction against `store`.
    #[must_use]
    pub fn begin(store: Arc<dyn EntityStore>) -> Self {
        Self {
            store,
            reads: HashMap::new(),
            read_order: Vec::new(),
            writes: Vec::new(),
        }
    }

    /// Read an entity inside the transaction.
    ///
    /// Buffered writes are visible to later reads of the same key. The
    /// version observed on the first read is what the commit validates.
    ///
    /// # Errors
    ///
    /// Propagates store failures and deserialization errors.
    pub async fn get<E: Entity>(&mut self, key: &EntityKey) -> Result<Option<E>, StoreError> {
        if let Some(pending) = self.writes.iter().rev().find(|doc| doc.key() == key) {
            return pending.to_entity().map(Some);
        }

        let loaded = self.store.get(key.clone()).await?;
        if !self.reads.contains_key(key) {
            self.reads
                .insert(key.clone(), loaded.as_ref().map(|found| found.version));
            self.read_order.push(key.clone());
        }

        loaded.map(|found| found.document.to_entity()).transpose()
    }

    /// Buffer a write of `entity`.
    ///
    /// # Errors
    ///
    /// Returns `SerializationError` if the entity cannot be converted to a
    /// document.
    pub fn put<E: Entity>(&mut self, entity: &E) -> Result<(), StoreError> {
        let document = Document::from_entity(entity)?;
        self.writes.retain(|doc| doc.key() != document.key());
        self.writes.push(document);
        Ok(())
    }

    /// True if no write has been buffered.
    #[must_use]
    pub fn is_read_only(&self) -> bool {
        self.writes.is_empty()
    }

    /// Submit the transaction.
    ///
    /// Read-only transactions complete without contacting the store.
    ///
    /// # Errors
    ///
    /// - `ConcurrencyConflict`: a read entity changed; nothing was written
    /// - any other store failure; nothing was written
    pub async fn commit(self) -> Result<(), StoreError> {
        if self.is_read_only() {
            return Ok(());
        }

        let Self {
            store,
            mut reads,
            read_order,
            writes,
        } = self;

        let changes = ChangeSet {
            reads: read_order
                .into_iter()
                .filter_map(|key| reads.remove(&key).map(|version| (key, version)))
                .collect(),
            writes,
        };

        store.commit(changes).await
    }
}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("reads", &self.read_order)
            .field("writes", &self.writes.len())
            .finish_non_exhaustive()
    }
}
