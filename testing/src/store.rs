//! In-memory [`EntityStore`] with optimistic concurrency control.
//!
//! Used by unit and integration tests and by the demo binary. Commits are
//! validated and applied under a single lock, so they are linearizable.
//! Fault injection hooks let tests force conflicts and outages.

use conference_core::entity::{Document, Entity};
use conference_core::entity_store::{ChangeSet, EntityStore, StoreError, StoreFuture, Versioned};
use conference_core::key::{EntityKey, Version};
use conference_core::query::Query;
use conference_runtime::metrics::StoreMetrics;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
struct StoreState {
    entities: BTreeMap<EntityKey, (Document, Version)>,
    next_ids: HashMap<String, i64>,
}

/// In-memory entity store.
///
/// # Example
///
/// ```
/// use conference_testing::mocks::InMemoryEntityStore;
///
/// let store = InMemoryEntityStore::new();
/// store.fail_next_commits(2);
/// assert_eq!(store.commit_count(), 0);
/// ```
#[derive(Debug, Default)]
pub struct InMemoryEntityStore {
    state: Mutex<StoreState>,
    latency: Option<Duration>,
    fail_commits: AtomicUsize,
    unavailable: AtomicBool,
    commits: AtomicUsize,
    conflicts: AtomicUsize,
}

impl InMemoryEntityStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store that sleeps for `latency` before every operation.
    ///
    /// Useful for widening the window between a transaction's reads and its
    /// commit in concurrency tests.
    #[must_use]
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency: Some(latency),
            ..Self::default()
        }
    }

    /// Reject the next `n` commits with a synthetic `ConcurrencyConflict`.
    pub fn fail_next_commits(&self, n: usize) {
        self.fail_commits.store(n, Ordering::SeqCst);
    }

    /// Make every operation fail with `Unavailable` until reset.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of successfully applied commits (including single `put`s).
    #[must_use]
    pub fn commit_count(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    /// Number of commits rejected with a conflict (real or injected).
    #[must_use]
    pub fn conflict_count(&self) -> usize {
        self.conflicts.load(Ordering::SeqCst)
    }

    /// Number of stored entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().entities.len()
    }

    /// True if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Store `entity` directly, bypassing fault injection. For test setup.
    ///
    /// # Errors
    ///
    /// Returns `SerializationError` if the entity cannot be serialized.
    pub fn seed<E: Entity>(&self, entity: &E) -> Result<Version, StoreError> {
        let document = Document::from_entity(entity)?;
        Ok(Self::write(&mut self.lock(), document))
    }

    /// Read an entity directly. For test assertions.
    ///
    /// # Errors
    ///
    /// Returns `SerializationError` if the stored document does not fit `E`.
    pub fn load<E: Entity>(&self, key: &EntityKey) -> Result<Option<E>, StoreError> {
        self.lock()
            .entities
            .get(key)
            .map(|(document, _)| document.to_entity())
            .transpose()
    }

    /// Every stored entity of type `E`, in key order. For test assertions.
    ///
    /// # Errors
    ///
    /// Returns `SerializationError` if a stored document does not fit `E`.
    pub fn all<E: Entity>(&self) -> Result<Vec<E>, StoreError> {
        self.lock()
            .entities
            .values()
            .filter(|(document, _)| document.key().kind() == E::KIND)
            .map(|(document, _)| document.to_entity())
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn simulate_io(&self) -> Result<(), StoreError> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("in-memory store is offline".to_string()));
        }
        Ok(())
    }

    fn take_injected_failure(&self) -> bool {
        self.fail_commits
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn write(state: &mut StoreState, document: Document) -> Version {
        let version = state
            .entities
            .get(document.key())
            .map_or(Version::new(1), |(_, current)| current.next());
        state
            .entities
            .insert(document.key().clone(), (document, version));
        version
    }

    fn conflict(&self, key: EntityKey, expected: Option<Version>, actual: Option<Version>) -> StoreError {
        self.conflicts.fetch_add(1, Ordering::SeqCst);
        StoreMetrics::record_conflict();
        tracing::debug!(%key, ?expected, ?actual, "Rejecting commit");
        StoreError::ConcurrencyConflict {
            key,
            expected,
            actual,
        }
    }
}

impl EntityStore for InMemoryEntityStore {
    fn get(&self, key: EntityKey) -> StoreFuture<'_, Option<Versioned>> {
        Box::pin(async move {
            self.simulate_io().await?;
            StoreMetrics::record_read();
            Ok(self
                .lock()
                .entities
                .get(&key)
                .map(|(document, version)| Versioned {
                    document: document.clone(),
                    version: *version,
                }))
        })
    }

    fn put(&self, document: Document) -> StoreFuture<'_, Version> {
        Box::pin(async move {
            self.simulate_io().await?;
            let started = Instant::now();
            let version = Self::write(&mut self.lock(), document);
            self.commits.fetch_add(1, Ordering::SeqCst);
            StoreMetrics::record_commit(1, started.elapsed());
            Ok(version)
        })
    }

    fn commit(&self, changes: ChangeSet) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            self.simulate_io().await?;

            if self.take_injected_failure() {
                let key = changes
                    .reads
                    .first()
                    .map(|(key, _)| key.clone())
                    .or_else(|| changes.writes.first().map(|doc| doc.key().clone()))
                    .unwrap_or_else(|| EntityKey::named("Injected", "conflict"));
                let expected = changes.reads.first().and_then(|(_, version)| *version);
                return Err(self.conflict(key, expected, expected.map(|v| v.next())));
            }

            let started = Instant::now();
            let mut state = self.lock();

            for (key, expected) in &changes.reads {
                let actual = state.entities.get(key).map(|(_, version)| *version);
                if actual != *expected {
                    drop(state);
                    return Err(self.conflict(key.clone(), *expected, actual));
                }
            }

            let writes = changes.writes.len();
            for document in changes.writes {
                Self::write(&mut state, document);
            }
            drop(state);

            self.commits.fetch_add(1, Ordering::SeqCst);
            StoreMetrics::record_commit(writes, started.elapsed());
            Ok(())
        })
    }

    fn allocate_key(&self, kind: String, parent: Option<EntityKey>) -> StoreFuture<'_, EntityKey> {
        Box::pin(async move {
            self.simulate_io().await?;
            let mut state = self.lock();
            let next = state.next_ids.entry(kind.clone()).or_insert(0);
            *next += 1;
            let key = EntityKey::numeric(kind, *next);
            Ok(match parent {
                Some(parent) => key.with_parent(parent),
                None => key,
            })
        })
    }

    fn get_or_insert(&self, document: Document) -> StoreFuture<'_, Document> {
        Box::pin(async move {
            self.simulate_io().await?;
            let mut state = self.lock();
            if let Some((existing, _)) = state.entities.get(document.key()) {
                return Ok(existing.clone());
            }
            Self::write(&mut state, document.clone());
            drop(state);
            self.commits.fetch_add(1, Ordering::SeqCst);
            Ok(document)
        })
    }

    fn query(&self, query: Query) -> StoreFuture<'_, Vec<Document>> {
        Box::pin(async move {
            self.simulate_io().await?;
            let candidates: Vec<Document> = self
                .lock()
                .entities
                .values()
                .filter(|(document, _)| document.key().kind() == query.kind)
                .map(|(document, _)| document.clone())
                .collect();
            tracing::trace!(%query, candidates = candidates.len(), "Running query");
            Ok(query.apply(candidates))
        })
    }
}
