//! Conference registration.
//!
//! The seat decision is a pure [`RegistrationReducer`]; [`RegistrationManager`]
//! is the shell around it. Each attempt opens one transaction covering the
//! caller's profile and the conference, runs the reducer, and commits both
//! entities together. A commit that loses a race is retried from the reads,
//! so two callers can never both take the last seat.

use crate::error::{ConferenceError, ConflictReason};
use crate::profiles::{load_or_new, require_identity};
use crate::transactional::with_retries;
use crate::types::{Conference, Identity, Profile};
use conference_core::effect::Effect;
use conference_core::entity_store::EntityStore;
use conference_core::key::EntityKey;
use conference_core::reducer::Reducer;
use conference_core::transaction::Transaction;
use conference_core::SmallVec;
use conference_runtime::metrics::RegistrationMetrics;
use conference_runtime::retry::RetryPolicy;
use std::sync::Arc;
use std::time::Instant;

// ============================================================================
// State
// ============================================================================

/// Result of a registration request that did not conflict.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RegistrationOutcome {
    /// Seat taken
    Registered,
    /// Seat released
    Unregistered,
    /// Unregister for a user who was not attending; nothing changed
    NotRegistered,
}

impl RegistrationOutcome {
    /// False only for `NotRegistered`.
    #[must_use]
    pub const fn is_success(self) -> bool {
        !matches!(self, Self::NotRegistered)
    }

    /// Label used in logs and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Registered => "registered",
            Self::Unregistered => "unregistered",
            Self::NotRegistered => "not_registered",
        }
    }
}

/// What the reducer decided.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Decision {
    /// No action applied yet
    #[default]
    Pending,
    /// Action applied (or was a no-op)
    Accepted(RegistrationOutcome),
    /// Action refused; state untouched
    Rejected(ConflictReason),
}

/// The entities a registration touches.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RegistrationState {
    /// Caller's profile
    pub profile: Profile,
    /// Target conference
    pub conference: Conference,
    /// Outcome of the last action
    pub decision: Decision,
}

impl RegistrationState {
    /// State before any action.
    #[must_use]
    pub const fn new(profile: Profile, conference: Conference) -> Self {
        Self {
            profile,
            conference,
            decision: Decision::Pending,
        }
    }
}

// ============================================================================
// Actions
// ============================================================================

/// Registration commands.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RegistrationAction {
    /// Take a seat
    Register,
    /// Give the seat back
    Unregister,
}

// ============================================================================
// Reducer
// ============================================================================

/// Pure seat-reservation logic.
///
/// Safe to re-run on freshly loaded state; it never performs I/O.
#[derive(Clone, Copy, Debug, Default)]
pub struct RegistrationReducer;

impl RegistrationReducer {
    fn validate_register(state: &RegistrationState) -> Result<(), ConflictReason> {
        if state.profile.is_attending(&state.conference.key) {
            return Err(ConflictReason::AlreadyRegistered);
        }
        if state.conference.seats_available <= 0 {
            return Err(ConflictReason::NoSeatsAvailable);
        }
        Ok(())
    }
}

impl Reducer for RegistrationReducer {
    type State = RegistrationState;
    type Action = RegistrationAction;
    type Environment = ();

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        _env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        match action {
            RegistrationAction::Register => {
                if let Err(reason) = Self::validate_register(state) {
                    state.decision = Decision::Rejected(reason);
                    return SmallVec::new();
                }

                let key = state.conference.key.clone();
                state.profile.conference_keys_to_attend.push(key);
                state.conference.seats_available -= 1;
                state.decision = Decision::Accepted(RegistrationOutcome::Registered);
            },
            RegistrationAction::Unregister => {
                let key = &state.conference.key;
                let before = state.profile.conference_keys_to_attend.len();
                state
                    .profile
                    .conference_keys_to_attend
                    .retain(|attending| attending != key);

                if state.profile.conference_keys_to_attend.len() == before {
                    state.decision = Decision::Accepted(RegistrationOutcome::NotRegistered);
                } else {
                    state.conference.seats_available += 1;
                    state.decision = Decision::Accepted(RegistrationOutcome::Unregistered);
                }
            },
        }

        SmallVec::new()
    }
}

// ============================================================================
// Manager
// ============================================================================

/// Registers and unregisters users, one transaction per attempt.
#[derive(Clone)]
pub struct RegistrationManager {
    store: Arc<dyn EntityStore>,
    policy: RetryPolicy,
}

impl RegistrationManager {
    /// Create a manager over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn EntityStore>, policy: RetryPolicy) -> Self {
        Self { store, policy }
    }

    /// Take a seat at `conference` for the caller.
    ///
    /// # Errors
    ///
    /// - `Unauthorized` without an identity
    /// - `NotFound` if the conference does not exist
    /// - `Conflict(AlreadyRegistered)` or `Conflict(NoSeatsAvailable)`
    /// - `TransientStoreContention` if retries run out
    #[tracing::instrument(skip_all, fields(conference = %conference))]
    pub async fn register(
        &self,
        identity: Option<&Identity>,
        conference: &EntityKey,
    ) -> Result<RegistrationOutcome, ConferenceError> {
        let identity = require_identity(identity)?;
        let started = Instant::now();
        let result = self
            .execute(identity, conference, RegistrationAction::Register)
            .await;
        RegistrationMetrics::record_register(Self::metric_label(&result), started.elapsed());
        result
    }

    /// Release the caller's seat at `conference`.
    ///
    /// Returns `NotRegistered` if the caller was not attending.
    ///
    /// # Errors
    ///
    /// - `Unauthorized` without an identity
    /// - `NotFound` if the conference does not exist
    /// - `TransientStoreContention` if retries run out
    #[tracing::instrument(skip_all, fields(conference = %conference))]
    pub async fn unregister(
        &self,
        identity: Option<&Identity>,
        conference: &EntityKey,
    ) -> Result<RegistrationOutcome, ConferenceError> {
        let identity = require_identity(identity)?;
        let result = self
            .execute(identity, conference, RegistrationAction::Unregister)
            .await;
        RegistrationMetrics::record_unregister(Self::metric_label(&result));
        result
    }

    async fn execute(
        &self,
        identity: &Identity,
        conference: &EntityKey,
        action: RegistrationAction,
    ) -> Result<RegistrationOutcome, ConferenceError> {
        let result = with_retries(&self.policy, || self.attempt(identity, conference, action)).await;

        match &result {
            Ok(outcome) => {
                tracing::info!(user = %identity.user_id, outcome = outcome.as_str(), "Registration applied");
            },
            Err(ConferenceError::Conflict(reason)) => {
                tracing::warn!(user = %identity.user_id, reason = reason.code(), "Registration refused");
            },
            Err(err) => {
                tracing::warn!(user = %identity.user_id, error = %err, "Registration failed");
            },
        }
        result
    }

    async fn attempt(
        &self,
        identity: &Identity,
        conference: &EntityKey,
        action: RegistrationAction,
    ) -> Result<RegistrationOutcome, ConferenceError> {
        let mut txn = Transaction::begin(Arc::clone(&self.store));
        let (profile, created) = load_or_new(&mut txn, identity).await?;
        let conference = txn
            .get::<Conference>(conference)
            .await?
            .ok_or_else(|| ConferenceError::conference_not_found(conference.clone()))?;

        let mut state = RegistrationState::new(profile, conference);
        RegistrationReducer.reduce(&mut state, action, &());

        match state.decision {
            Decision::Pending => Err(ConferenceError::Internal(
                "registration reducer made no decision".to_string(),
            )),
            Decision::Rejected(reason) => Err(ConferenceError::Conflict(reason)),
            Decision::Accepted(outcome) => {
                if outcome.is_success() {
                    txn.put(&state.profile)?;
                    txn.put(&state.conference)?;
                } else if created {
                    txn.put(&state.profile)?;
                }
                txn.commit().await?;
                Ok(outcome)
            },
        }
    }

    fn metric_label(result: &Result<RegistrationOutcome, ConferenceError>) -> &'static str {
        match result {
            Ok(outcome) => outcome.as_str(),
            Err(ConferenceError::Conflict(reason)) => reason.code(),
            Err(ConferenceError::NotFound { .. }) => "not_found",
            Err(ConferenceError::TransientStoreContention { .. }) => "contention",
            Err(_) => "error",
        }
    }
}

impl std::fmt::Debug for RegistrationManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistrationManager")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}
