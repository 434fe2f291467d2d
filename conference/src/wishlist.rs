//! Session wishlists.

use crate::error::ConferenceError;
use crate::profiles::{load_or_new, require_identity};
use crate::transactional::with_retries;
use crate::types::{Identity, Profile, Session};
use conference_core::effect::Effect;
use conference_core::entity_store::EntityStore;
use conference_core::key::EntityKey;
use conference_core::reducer::Reducer;
use conference_core::transaction::Transaction;
use conference_core::SmallVec;
use conference_runtime::retry::RetryPolicy;
use std::sync::Arc;

/// A profile plus whether the last action changed it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WishlistState {
    /// Caller's profile
    pub profile: Profile,
    /// True if the last action appended a session
    pub added: bool,
}

/// Wishlist commands.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WishlistAction {
    /// Append a session unless it is already present
    Add(EntityKey),
}

/// Idempotent wishlist updates.
#[derive(Clone, Copy, Debug, Default)]
pub struct WishlistReducer;

impl Reducer for WishlistReducer {
    type State = WishlistState;
    type Action = WishlistAction;
    type Environment = ();

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        _env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        match action {
            WishlistAction::Add(session) => {
                state.added = !state.profile.has_wishlisted(&session);
                if state.added {
                    state.profile.wish_list_session_keys.push(session);
                }
            },
        }
        SmallVec::new()
    }
}

/// Adds sessions to user wishlists.
#[derive(Clone)]
pub struct WishlistManager {
    store: Arc<dyn EntityStore>,
    policy: RetryPolicy,
}

impl WishlistManager {
    /// Create a manager over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn EntityStore>, policy: RetryPolicy) -> Self {
        Self { store, policy }
    }

    /// Put `session` on the caller's wishlist.
    ///
    /// Returns `false` if it was already there.
    ///
    /// # Errors
    ///
    /// `Unauthorized`, `NotFound` for an unknown session,
    /// `TransientStoreContention` if retries run out.
    #[tracing::instrument(skip_all, fields(session = %session))]
    pub async fn add_to_wishlist(
        &self,
        identity: Option<&Identity>,
        session: &EntityKey,
    ) -> Result<bool, ConferenceError> {
        let identity = require_identity(identity)?;
        let added = with_retries(&self.policy, || self.attempt(identity, session)).await?;
        tracing::info!(user = %identity.user_id, added, "Wishlist updated");
        Ok(added)
    }

    /// Sessions on the caller's wishlist, in the order they were added.
    ///
    /// Sessions that no longer exist are skipped.
    ///
    /// # Errors
    ///
    /// `Unauthorized` without an identity; store failures otherwise.
    pub async fn sessions_in_wishlist(
        &self,
        identity: Option<&Identity>,
    ) -> Result<Vec<Session>, ConferenceError> {
        let identity = require_identity(identity)?;
        let Some(found) = self.store.get(identity.profile_key()).await? else {
            return Ok(Vec::new());
        };
        let profile: Profile = found.document.to_entity()?;

        let mut sessions = Vec::with_capacity(profile.wish_list_session_keys.len());
        for key in profile.wish_list_session_keys {
            if let Some(found) = self.store.get(key).await? {
                sessions.push(found.document.to_entity()?);
            }
        }
        Ok(sessions)
    }

    async fn attempt(&self, identity: &Identity, session: &EntityKey) -> Result<bool, ConferenceError> {
        let mut txn = Transaction::begin(Arc::clone(&self.store));
        let (profile, created) = load_or_new(&mut txn, identity).await?;
        if txn.get::<Session>(session).await?.is_none() {
            return Err(ConferenceError::session_not_found(session.clone()));
        }

        let mut state = WishlistState {
            profile,
            added: false,
        };
        WishlistReducer.reduce(&mut state, WishlistAction::Add(session.clone()), &());

        if state.added || created {
            txn.put(&state.profile)?;
        }
        txn.commit().await?;
        Ok(state.added)
    }
}

impl std::fmt::Debug for WishlistManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WishlistManager")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}
