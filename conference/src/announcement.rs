//! "Nearly sold out" announcement.
//!
//! The announcement lives in a cache slot. [`AnnouncementCache::recompute`]
//! rebuilds it from the store and [`AnnouncementCache::read`] returns whatever
//! is cached, so readers never wait on a scan. A refresher task recomputes on
//! a fixed period.

use crate::error::ConferenceError;
use crate::types::Conference;
use conference_core::cache::CacheService;
use conference_core::entity::Entity;
use conference_core::entity_store::EntityStore;
use conference_core::query::{Operator, Query};
use conference_runtime::metrics::AnnouncementMetrics;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Cache key of the announcement.
pub const ANNOUNCEMENT_CACHE_KEY: &str = "RECENT_ANNOUNCEMENTS";

/// Text preceding the list of conference names.
pub const ANNOUNCEMENT_PREFIX: &str =
    "Last chance to attend! The following conferences are nearly sold out: ";

/// Conferences with at most this many seats left are announced.
pub const DEFAULT_SEAT_THRESHOLD: i64 = 5;

/// Maintains the announcement slot.
#[derive(Clone)]
pub struct AnnouncementCache {
    store: Arc<dyn EntityStore>,
    cache: Arc<dyn CacheService>,
    seat_threshold: i64,
}

impl AnnouncementCache {
    /// Create an announcement cache.
    #[must_use]
    pub fn new(store: Arc<dyn EntityStore>, cache: Arc<dyn CacheService>, seat_threshold: i64) -> Self {
        Self {
            store,
            cache,
            seat_threshold,
        }
    }

    /// The query selecting nearly full conferences.
    #[must_use]
    pub fn nearly_sold_out_query(&self) -> Query {
        Query::new(Conference::KIND)
            .filter("seatsAvailable", Operator::Le, self.seat_threshold)
            .filter("seatsAvailable", Operator::Gt, 0_i64)
            .order_by("seatsAvailable")
            .order_by("name")
            .project(&["name"])
    }

    /// Rebuild the announcement and store it.
    ///
    /// Clears the slot and returns `""` when no conference qualifies.
    ///
    /// # Errors
    ///
    /// Propagates store failures; the cached value is left as it was.
    pub async fn recompute(&self) -> Result<String, ConferenceError> {
        let documents = self.store.query(self.nearly_sold_out_query()).await?;
        let names: Vec<&str> = documents
            .iter()
            .filter_map(|doc| doc.property("name").and_then(|name| name.as_str()))
            .collect();
        AnnouncementMetrics::record_refresh(names.len());

        if names.is_empty() {
            self.cache.delete(ANNOUNCEMENT_CACHE_KEY);
            tracing::debug!("No nearly sold out conferences");
            return Ok(String::new());
        }

        let announcement = format!("{ANNOUNCEMENT_PREFIX}{}", names.join(", "));
        self.cache.set(ANNOUNCEMENT_CACHE_KEY, announcement.clone());
        tracing::info!(conferences = names.len(), "Announcement refreshed");
        Ok(announcement)
    }

    /// The cached announcement, or `""`.
    #[must_use]
    pub fn read(&self) -> String {
        self.cache.get(ANNOUNCEMENT_CACHE_KEY).unwrap_or_default()
    }

    /// Recompute every `period`, starting immediately.
    ///
    /// Failures are logged and the previous value is kept. Abort the returned
    /// handle to stop refreshing.
    #[must_use]
    pub fn spawn_refresher(&self, period: Duration) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                if let Err(err) = this.recompute().await {
                    tracing::warn!(error = %err, "Announcement refresh failed");
                }
            }
        })
    }
}

impl std::fmt::Debug for AnnouncementCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnnouncementCache")
            .field("seat_threshold", &self.seat_threshold)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conference_core::key::EntityKey;
    use conference_runtime::MemoryCache;
    use conference_testing::mocks::InMemoryEntityStore;

    fn conference(id: i64, name: &str, seats: i64) -> Conference {
        Conference {
            key: EntityKey::numeric("Conference", id).with_parent(EntityKey::named("Profile", "org")),
            name: name.into(),
            description: None,
            organizer_user_id: "org".into(),
            topics: Vec::new(),
            city: "Default City".into(),
            start_date: None,
            end_date: None,
            month: 0,
            max_attendees: 10,
            seats_available: seats,
        }
    }

    fn setup(seats: &[(&str, i64)]) -> (Arc<MemoryCache>, AnnouncementCache) {
        let store = Arc::new(InMemoryEntityStore::new());
        for (id, (name, seats)) in (1_i64..).zip(seats) {
            store.seed(&conference(id, name, *seats)).unwrap();
        }
        let cache = Arc::new(MemoryCache::new());
        let announcements = AnnouncementCache::new(store, cache.clone(), DEFAULT_SEAT_THRESHOLD);
        (cache, announcements)
    }

    #[tokio::test]
    async fn lists_only_conferences_with_a_few_seats_left() {
        let (_, announcements) = setup(&[("Almost", 3), ("Full", 0), ("Roomy", 6)]);

        let text = announcements.recompute().await.unwrap();
        assert_eq!(
            text,
            "Last chance to attend! The following conferences are nearly sold out: Almost"
        );
        assert_eq!(announcements.read(), text);
    }

    #[tokio::test]
    async fn orders_by_seats_then_name() {
        let (_, announcements) = setup(&[("Zeta", 1), ("Beta", 4), ("Alpha", 4), ("Edge", 5)]);

        let text = announcements.recompute().await.unwrap();
        assert!(text.ends_with("Zeta, Alpha, Beta, Edge"), "{text}");
    }

    #[tokio::test]
    async fn clears_the_slot_when_nothing_qualifies() {
        let (cache, announcements) = setup(&[("Roomy", 50)]);
        cache.set(ANNOUNCEMENT_CACHE_KEY, "stale".into());

        assert_eq!(announcements.recompute().await.unwrap(), "");
        assert_eq!(announcements.read(), "");
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn refresher_populates_the_slot() {
        let (_, announcements) = setup(&[("Almost", 2)]);

        let handle = announcements.spawn_refresher(Duration::from_millis(10));
        for _ in 0..50 {
            if !announcements.read().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        handle.abort();

        assert!(announcements.read().ends_with("Almost"));
    }
}
