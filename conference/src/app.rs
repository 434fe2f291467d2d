//! Application wiring.

use crate::announcement::AnnouncementCache;
use crate::conferences::ConferenceService;
use crate::config::Config;
use crate::profiles::ProfileService;
use crate::registration::RegistrationManager;
use crate::sessions::SessionService;
use crate::wishlist::WishlistManager;
use conference_core::cache::CacheService;
use conference_core::dispatcher::TaskDispatcher;
use conference_core::entity_store::EntityStore;
use conference_core::environment::Clock;
use std::sync::Arc;

/// Every service, sharing one store, cache, dispatcher and clock.
#[derive(Clone, Debug)]
pub struct ConferenceApp {
    /// Conference creation and listings
    pub conferences: ConferenceService,
    /// Profiles
    pub profiles: ProfileService,
    /// Sessions and featured speakers
    pub sessions: SessionService,
    /// Seat reservations
    pub registrations: RegistrationManager,
    /// Session wishlists
    pub wishlist: WishlistManager,
    /// "Nearly sold out" announcement
    pub announcements: AnnouncementCache,
}

impl ConferenceApp {
    /// Build the services.
    #[must_use]
    pub fn new(
        store: Arc<dyn EntityStore>,
        cache: Arc<dyn CacheService>,
        dispatcher: Arc<dyn TaskDispatcher>,
        clock: Arc<dyn Clock>,
        config: &Config,
    ) -> Self {
        let policy = config.retry_policy();
        Self {
            conferences: ConferenceService::new(
                Arc::clone(&store),
                Arc::clone(&dispatcher),
                Arc::clone(&clock),
                policy.clone(),
            ),
            profiles: ProfileService::new(Arc::clone(&store), policy.clone()),
            sessions: SessionService::new(
                Arc::clone(&store),
                Arc::clone(&cache),
                dispatcher,
                clock,
                policy.clone(),
            ),
            registrations: RegistrationManager::new(Arc::clone(&store), policy.clone()),
            wishlist: WishlistManager::new(Arc::clone(&store), policy),
            announcements: AnnouncementCache::new(store, cache, config.announcement.seat_threshold),
        }
    }
}
