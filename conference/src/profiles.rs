//! Profile service.
//!
//! Profiles are created lazily: the first call that needs one inserts it with
//! the caller's nickname and email.

use crate::error::ConferenceError;
use crate::forms::{ProfileUpdate, non_blank};
use crate::transactional::with_retries;
use crate::types::{Identity, Profile};
use conference_core::entity::Document;
use conference_core::entity_store::{EntityStore, StoreError};
use conference_core::transaction::Transaction;
use conference_runtime::retry::RetryPolicy;
use std::sync::Arc;

/// Reject anonymous callers.
pub(crate) fn require_identity(identity: Option<&Identity>) -> Result<&Identity, ConferenceError> {
    identity.ok_or(ConferenceError::Unauthorized)
}

/// Load the caller's profile inside `txn`, or build a fresh one.
///
/// Returns the profile and whether it was newly built. A fresh profile is not
/// buffered; the caller decides whether to write it.
pub(crate) async fn load_or_new(
    txn: &mut Transaction,
    identity: &Identity,
) -> Result<(Profile, bool), StoreError> {
    match txn.get::<Profile>(&identity.profile_key()).await? {
        Some(profile) => Ok((profile, false)),
        None => Ok((Profile::new(identity), true)),
    }
}

/// Reads and edits user profiles.
#[derive(Clone)]
pub struct ProfileService {
    store: Arc<dyn EntityStore>,
    policy: RetryPolicy,
}

impl ProfileService {
    /// Create a service over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn EntityStore>, policy: RetryPolicy) -> Self {
        Self { store, policy }
    }

    /// The caller's profile, created on first access.
    ///
    /// # Errors
    ///
    /// `Unauthorized` without an identity; store failures otherwise.
    pub async fn get_or_create_profile(
        &self,
        identity: Option<&Identity>,
    ) -> Result<Profile, ConferenceError> {
        let identity = require_identity(identity)?;
        let fresh = Document::from_entity(&Profile::new(identity))?;
        let stored = self.store.get_or_insert(fresh).await?;
        Ok(stored.to_entity()?)
    }

    /// Update the display name and t-shirt size.
    ///
    /// Blank or absent fields are left unchanged.
    ///
    /// # Errors
    ///
    /// `Unauthorized` without an identity; `TransientStoreContention` if the
    /// profile stays contended; store failures otherwise.
    pub async fn save_profile(
        &self,
        identity: Option<&Identity>,
        update: ProfileUpdate,
    ) -> Result<Profile, ConferenceError> {
        let identity = require_identity(identity)?;
        let profile = with_retries(&self.policy, || self.apply(identity, &update)).await?;
        tracing::info!(user = %identity.user_id, "Profile saved");
        Ok(profile)
    }

    async fn apply(&self, identity: &Identity, update: &ProfileUpdate) -> Result<Profile, ConferenceError> {
        let mut txn = Transaction::begin(Arc::clone(&self.store));
        let (mut profile, _) = load_or_new(&mut txn, identity).await?;

        if let Some(name) = non_blank(update.display_name.as_deref()) {
            profile.display_name = name.to_string();
        }
        if let Some(size) = update.tee_shirt_size {
            profile.tee_shirt_size = size;
        }

        txn.put(&profile)?;
        txn.commit().await?;
        Ok(profile)
    }
}

impl std::fmt::Debug for ProfileService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProfileService")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}
