//! Error types for the conference service.

use conference_core::entity_store::StoreError;
use conference_core::key::{EntityKey, ParseKeyError};
use std::fmt;
use thiserror::Error;

/// Why a registration was refused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ConflictReason {
    /// The user is already on the attendee list
    AlreadyRegistered,
    /// The conference has no seats left
    NoSeatsAvailable,
}

impl ConflictReason {
    /// Stable machine-readable code.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::AlreadyRegistered => "ALREADY_REGISTERED",
            Self::NoSeatsAvailable => "NO_SEATS",
        }
    }
}

impl fmt::Display for ConflictReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyRegistered => f.write_str("You have already registered for this conference"),
            Self::NoSeatsAvailable => f.write_str("There are no seats available."),
        }
    }
}

/// Coarse classification of a [`ConferenceError`].
///
/// Lets callers map failures onto a transport without matching every variant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Referenced entity does not exist
    NotFound,
    /// Caller may not mutate the entity
    Forbidden,
    /// No identity supplied
    Unauthorized,
    /// Malformed or incomplete input
    BadRequest,
    /// Business-rule conflict
    Conflict,
    /// Backend unavailable or contended; retry later
    Unavailable,
    /// Anything else
    Internal,
}

/// Errors returned by conference services.
#[derive(Error, Debug)]
pub enum ConferenceError {
    /// Referenced entity does not exist
    #[error("No {kind} found with key: {key}")]
    NotFound {
        /// Entity kind, lower-cased
        kind: &'static str,
        /// Key that was looked up
        key: EntityKey,
    },

    /// Non-owner mutation
    #[error("{0}")]
    Forbidden(String),

    /// No identity
    #[error("Authorization required")]
    Unauthorized,

    /// Missing required field or malformed value
    #[error("{0}")]
    BadRequest(String),

    /// Registration refused
    #[error("{0}")]
    Conflict(ConflictReason),

    /// Unknown filter field or operator
    #[error("Filter contains invalid field or operator: {0}")]
    InvalidFilter(String),

    /// Numeric filter value could not be parsed
    #[error("Invalid value for filter field {field}: {value}")]
    InvalidFilterValue {
        /// Field being filtered
        field: String,
        /// Raw value supplied
        value: String,
    },

    /// Inequality filters on two different fields
    #[error("Inequality filter is allowed on only one field (got {first} and {second})")]
    UnsupportedFilterCombination {
        /// Field of the first inequality
        first: String,
        /// Field of the offending inequality
        second: String,
    },

    /// Retries exhausted on a contended transaction
    #[error("Store contention persisted after {attempts} attempts")]
    TransientStoreContention {
        /// Number of attempts made
        attempts: usize,
    },

    /// Invalid entity key token
    #[error(transparent)]
    InvalidKey(#[from] ParseKeyError),

    /// Store failure
    #[error(transparent)]
    Store(#[from] StoreError),

    /// An invariant was broken inside the service
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ConferenceError {
    /// `NotFound` for a conference key.
    #[must_use]
    pub const fn conference_not_found(key: EntityKey) -> Self {
        Self::NotFound {
            kind: "conference",
            key,
        }
    }

    /// `NotFound` for a session key.
    #[must_use]
    pub const fn session_not_found(key: EntityKey) -> Self {
        Self::NotFound { kind: "session", key }
    }

    /// Classify the error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Forbidden(_) => ErrorKind::Forbidden,
            Self::Unauthorized => ErrorKind::Unauthorized,
            Self::BadRequest(_)
            | Self::InvalidFilter(_)
            | Self::InvalidFilterValue { .. }
            | Self::UnsupportedFilterCombination { .. }
            | Self::InvalidKey(_) => ErrorKind::BadRequest,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::TransientStoreContention { .. }
            | Self::Store(StoreError::Unavailable(_) | StoreError::ConcurrencyConflict { .. }) => {
                ErrorKind::Unavailable
            },
            Self::Store(_) | Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// True if re-running the whole operation may succeed.
    ///
    /// Only store write conflicts qualify; everything else is deterministic.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Store(err) if err.is_retryable())
    }

    /// The conflict reason, if this is a registration conflict.
    #[must_use]
    pub const fn conflict_reason(&self) -> Option<ConflictReason> {
        match self {
            Self::Conflict(reason) => Some(*reason),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conference_core::key::Version;

    #[test]
    fn conflict_messages() {
        assert_eq!(
            ConferenceError::Conflict(ConflictReason::AlreadyRegistered).to_string(),
            "You have already registered for this conference"
        );
        assert_eq!(
            ConferenceError::Conflict(ConflictReason::NoSeatsAvailable).to_string(),
            "There are no seats available."
        );
        assert_eq!(ConflictReason::NoSeatsAvailable.code(), "NO_SEATS");
    }

    #[test]
    fn not_found_names_the_key() {
        let key = EntityKey::numeric("Conference", 7);
        let err = ConferenceError::conference_not_found(key.clone());
        assert_eq!(err.to_string(), format!("No conference found with key: {key}"));
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn filter_errors_are_bad_requests() {
        let err = ConferenceError::UnsupportedFilterCombination {
            first: "month".into(),
            second: "maxAttendees".into(),
        };
        assert_eq!(err.kind(), ErrorKind::BadRequest);
        assert!(!err.is_retryable());
    }

    #[test]
    fn only_store_conflicts_are_retryable() {
        let conflict = ConferenceError::Store(StoreError::ConcurrencyConflict {
            key: EntityKey::numeric("Conference", 1),
            expected: Some(Version::new(1)),
            actual: Some(Version::new(2)),
        });
        assert!(conflict.is_retryable());
        assert_eq!(conflict.kind(), ErrorKind::Unavailable);

        let offline = ConferenceError::Store(StoreError::Unavailable("down".into()));
        assert!(!offline.is_retryable());
        assert_eq!(offline.kind(), ErrorKind::Unavailable);

        assert!(!ConferenceError::Conflict(ConflictReason::NoSeatsAvailable).is_retryable());
        assert_eq!(
            ConferenceError::TransientStoreContention { attempts: 4 }.kind(),
            ErrorKind::Unavailable
        );
    }
}
