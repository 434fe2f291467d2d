//! Process-wide cache service.
//!
//! A small string-keyed cache with explicit `set`/`get`/`delete` and no
//! expiry. Values are derived state (announcements, featured speakers):
//! writers recompute them from the store and overwrite the slot, readers
//! never wait for recomputation.

/// String cache shared by every request handler.
///
/// Last writer wins. Implementations must be cheap to read from many
/// threads concurrently.
pub trait CacheService: Send + Sync {
    /// Read a cached value.
    fn get(&self, key: &str) -> Option<String>;

    /// Store a value, replacing any previous one.
    fn set(&self, key: &str, value: String);

    /// Remove a value. Returns true if one was present.
    fn delete(&self, key: &str) -> bool;
}
