//! Domain types for the conference service.
//!
//! This module contains the stored entities (`Conference`, `Profile`,
//! `Session`, `Speaker`), their enumerations, and the caller identity.

use chrono::{NaiveDate, NaiveTime};
use conference_core::entity::Entity;
use conference_core::key::EntityKey;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Identity
// ============================================================================

/// An authenticated caller.
///
/// Resolved by the identity provider before any service is invoked. Services
/// take `Option<&Identity>` and reject `None` with `Unauthorized`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity {
    /// Stable user id
    pub user_id: String,
    /// Primary email address
    pub email: String,
    /// Short display name
    pub nickname: String,
}

impl Identity {
    /// Create an identity whose nickname is the local part of `email`.
    #[must_use]
    pub fn new(user_id: impl Into<String>, email: impl Into<String>) -> Self {
        let email = email.into();
        let nickname = email.split('@').next().unwrap_or_default().to_string();
        Self {
            user_id: user_id.into(),
            email,
            nickname,
        }
    }

    /// Override the nickname.
    #[must_use]
    pub fn with_nickname(mut self, nickname: impl Into<String>) -> Self {
        self.nickname = nickname.into();
        self
    }

    /// Key of this user's profile.
    #[must_use]
    pub fn profile_key(&self) -> EntityKey {
        Profile::key_for(&self.user_id)
    }
}

// ============================================================================
// Enumerations
// ============================================================================

/// Error returned when an enumeration value is not recognized.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown {kind}: {value}")]
pub struct UnknownVariant {
    kind: &'static str,
    value: String,
}

/// T-shirt size on a profile.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[allow(missing_docs)]
pub enum TeeShirtSize {
    #[default]
    NotSpecified,
    XsM,
    XsW,
    SM,
    SW,
    MM,
    MW,
    LM,
    LW,
    XlM,
    XlW,
    XxlM,
    XxlW,
    XxxlM,
    XxxlW,
}

impl TeeShirtSize {
    /// Every size, in catalogue order.
    pub const ALL: [Self; 15] = [
        Self::NotSpecified,
        Self::XsM,
        Self::XsW,
        Self::SM,
        Self::SW,
        Self::MM,
        Self::MW,
        Self::LM,
        Self::LW,
        Self::XlM,
        Self::XlW,
        Self::XxlM,
        Self::XxlW,
        Self::XxxlM,
        Self::XxxlW,
    ];

    /// Wire name (`NOT_SPECIFIED`, `XS_M`, ...).
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotSpecified => "NOT_SPECIFIED",
            Self::XsM => "XS_M",
            Self::XsW => "XS_W",
            Self::SM => "S_M",
            Self::SW => "S_W",
            Self::MM => "M_M",
            Self::MW => "M_W",
            Self::LM => "L_M",
            Self::LW => "L_W",
            Self::XlM => "XL_M",
            Self::XlW => "XL_W",
            Self::XxlM => "XXL_M",
            Self::XxlW => "XXL_W",
            Self::XxxlM => "XXXL_M",
            Self::XxxlW => "XXXL_W",
        }
    }
}

impl fmt::Display for TeeShirtSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TeeShirtSize {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|size| size.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownVariant {
                kind: "tee shirt size",
                value: s.to_string(),
            })
    }
}

/// Kind of conference session.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[allow(missing_docs)]
pub enum SessionType {
    #[default]
    #[serde(rename = "NOT_SPECIFIED")]
    NotSpecified,
    Lecture,
    Keynote,
    Workshop,
    QuestionsAndAnswers,
    Information,
}

impl SessionType {
    /// Every session type.
    pub const ALL: [Self; 6] = [
        Self::NotSpecified,
        Self::Lecture,
        Self::Keynote,
        Self::Workshop,
        Self::QuestionsAndAnswers,
        Self::Information,
    ];

    /// Stored name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotSpecified => "NOT_SPECIFIED",
            Self::Lecture => "Lecture",
            Self::Keynote => "Keynote",
            Self::Workshop => "Workshop",
            Self::QuestionsAndAnswers => "QuestionsAndAnswers",
            Self::Information => "Information",
        }
    }
}

impl fmt::Display for SessionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownVariant {
                kind: "session type",
                value: s.to_string(),
            })
    }
}

// ============================================================================
// Entities
// ============================================================================

/// A conference published by an organizer.
///
/// Stored under the organizer's profile key. Property names are camelCase so
/// filters address them as `city`, `topics`, `month`, `maxAttendees`,
/// `seatsAvailable` and `name`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conference {
    /// Store key (parent: organizer profile)
    pub key: EntityKey,
    /// Conference name
    pub name: String,
    /// Free-form description
    #[serde(default)]
    pub description: Option<String>,
    /// User id of the organizer
    pub organizer_user_id: String,
    /// Topics covered
    #[serde(default)]
    pub topics: Vec<String>,
    /// Host city
    pub city: String,
    /// First day
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    /// Last day
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    /// Month of `start_date`, 0 when there is none
    pub month: i64,
    /// Capacity
    pub max_attendees: i64,
    /// Remaining capacity
    pub seats_available: i64,
}

impl Conference {
    /// Number of registered attendees.
    #[must_use]
    pub const fn attendee_count(&self) -> i64 {
        self.max_attendees - self.seats_available
    }

    /// True if `user_id` organizes this conference.
    #[must_use]
    pub fn is_organized_by(&self, user_id: &str) -> bool {
        self.organizer_user_id == user_id
    }
}

impl Entity for Conference {
    const KIND: &'static str = "Conference";

    fn key(&self) -> &EntityKey {
        &self.key
    }
}

/// Per-user profile.
///
/// Created lazily on first access. Attendance and wishlist are ordered sets:
/// a key appears at most once.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    /// Store key (`Profile` named by user id)
    pub key: EntityKey,
    /// Display name
    pub display_name: String,
    /// Contact email
    pub main_email: String,
    /// T-shirt size
    #[serde(default)]
    pub tee_shirt_size: TeeShirtSize,
    /// Conferences the user registered for
    #[serde(default)]
    pub conference_keys_to_attend: Vec<EntityKey>,
    /// Sessions on the user's wishlist
    #[serde(default)]
    pub wish_list_session_keys: Vec<EntityKey>,
}

impl Profile {
    /// Key of the profile for `user_id`.
    #[must_use]
    pub fn key_for(user_id: &str) -> EntityKey {
        EntityKey::named(Self::KIND, user_id)
    }

    /// A fresh profile for `identity`.
    #[must_use]
    pub fn new(identity: &Identity) -> Self {
        Self {
            key: identity.profile_key(),
            display_name: identity.nickname.clone(),
            main_email: identity.email.clone(),
            tee_shirt_size: TeeShirtSize::NotSpecified,
            conference_keys_to_attend: Vec::new(),
            wish_list_session_keys: Vec::new(),
        }
    }

    /// True if the user is registered for `conference`.
    #[must_use]
    pub fn is_attending(&self, conference: &EntityKey) -> bool {
        self.conference_keys_to_attend.contains(conference)
    }

    /// True if `session` is on the wishlist.
    #[must_use]
    pub fn has_wishlisted(&self, session: &EntityKey) -> bool {
        self.wish_list_session_keys.contains(session)
    }
}

impl Entity for Profile {
    const KIND: &'static str = "Profile";

    fn key(&self) -> &EntityKey {
        &self.key
    }
}

/// A session within a conference.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Store key (parent: conference)
    pub key: EntityKey,
    /// Session title
    pub name: String,
    /// Highlights
    #[serde(default)]
    pub highlights: Vec<String>,
    /// Speaker keys
    #[serde(default)]
    pub speakers: Vec<EntityKey>,
    /// Length, as hours and minutes
    pub duration: NaiveTime,
    /// Session type
    pub type_of_session: SessionType,
    /// Day of the session
    pub date: NaiveDate,
    /// Start time
    pub start_time: NaiveTime,
}

impl Session {
    /// Key of the conference this session belongs to.
    #[must_use]
    pub fn conference_key(&self) -> Option<&EntityKey> {
        self.key.parent()
    }
}

impl Entity for Session {
    const KIND: &'static str = "Session";

    fn key(&self) -> &EntityKey {
        &self.key
    }
}

/// A speaker, deduplicated by normalized name.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Speaker {
    /// Store key (`Speaker` named by normalized name)
    pub key: EntityKey,
    /// Display name as first submitted
    pub name: String,
}

impl Speaker {
    /// Key of the speaker called `name`, in any case or spacing.
    #[must_use]
    pub fn key_for(name: &str) -> EntityKey {
        EntityKey::named(Self::KIND, normalize_speaker_name(name))
    }

    /// A speaker record for `name`.
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            key: Self::key_for(name),
            name: name.trim().to_string(),
        }
    }
}

impl Entity for Speaker {
    const KIND: &'static str = "Speaker";

    fn key(&self) -> &EntityKey {
        &self.key
    }
}

/// Speaker identity: lower-cased and trimmed.
#[must_use]
pub fn normalize_speaker_name(name: &str) -> String {
    name.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_nickname_defaults_to_email_local_part() {
        let identity = Identity::new("u1", "ada@example.com");
        assert_eq!(identity.nickname, "ada");
        assert_eq!(identity.profile_key(), EntityKey::named("Profile", "u1"));
    }

    #[test]
    fn enums_use_stored_names() {
        assert_eq!(
            serde_json::to_value(TeeShirtSize::XxlW).unwrap(),
            serde_json::json!("XXL_W")
        );
        assert_eq!(
            serde_json::to_value(SessionType::NotSpecified).unwrap(),
            serde_json::json!("NOT_SPECIFIED")
        );
        assert_eq!(
            serde_json::to_value(SessionType::QuestionsAndAnswers).unwrap(),
            serde_json::json!("QuestionsAndAnswers")
        );
        for size in TeeShirtSize::ALL {
            assert_eq!(serde_json::to_value(size).unwrap(), serde_json::json!(size.as_str()));
        }
    }

    #[test]
    fn enums_parse_case_insensitively() {
        assert_eq!("workshop".parse::<SessionType>().unwrap(), SessionType::Workshop);
        assert_eq!("xs_m".parse::<TeeShirtSize>().unwrap(), TeeShirtSize::XsM);
        assert!("Tutorial".parse::<SessionType>().is_err());
    }

    #[test]
    fn speakers_are_keyed_by_normalized_name() {
        assert_eq!(Speaker::key_for("  Grace Hopper "), Speaker::key_for("grace hopper"));
        assert_eq!(Speaker::new(" Grace Hopper ").name, "Grace Hopper");
    }

    #[test]
    fn session_time_serializes_as_sortable_text() {
        let time = NaiveTime::from_hms_opt(9, 0, 0).unwrap();
        assert_eq!(serde_json::to_value(time).unwrap(), serde_json::json!("09:00:00"));
    }
}
