//! # Conference Testing
//!
//! Testing utilities and helpers for the conference service.
//!
//! This crate provides:
//! - An in-memory `EntityStore` with optimistic concurrency and fault injection
//! - A recording `TaskDispatcher`
//! - A fixed `Clock`
//! - A Given-When-Then harness for reducers
//!
//! ## Example
//!
//! ```ignore
//! use conference_testing::mocks::{InMemoryEntityStore, RecordingDispatcher};
//!
//! #[tokio::test]
//! async fn registration_takes_a_seat() {
//!     let store = Arc::new(InMemoryEntityStore::new());
//!     store.seed(&conference_with_seats(10))?;
//!
//!     let manager = RegistrationManager::new(store.clone(), RetryPolicy::default());
//!     manager.register(&alice(), &key).await?;
//!
//!     let conference = store.load::<Conference>(&key)?.unwrap();
//!     assert_eq!(conference.seats_available, 9);
//! }
//! ```

use chrono::{DateTime, Utc};
use conference_core::environment::Clock;

mod dispatcher;
mod store;

/// Ergonomic reducer testing
pub mod reducer_test;

/// Mock implementations of Environment traits
pub mod mocks {
    use super::{Clock, DateTime, Utc};

    pub use crate::dispatcher::RecordingDispatcher;
    pub use crate::store::InMemoryEntityStore;

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use conference_testing::mocks::FixedClock;
    /// use conference_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// assert_eq!(clock.now(), clock.now());
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    #[must_use]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(DateTime::from_timestamp(1_735_689_600, 0).unwrap_or_default())
    }
}

// Re-export commonly used items
pub use mocks::{FixedClock, InMemoryEntityStore, RecordingDispatcher, test_clock};
pub use reducer_test::ReducerTest;
