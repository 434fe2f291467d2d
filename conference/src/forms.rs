//! Request payloads for the supplemented services.
//!
//! Forms carry optional fields as submitted; services apply defaults and
//! validation. Dates are read from their first ten characters (`YYYY-MM-DD`)
//! and times from their first five (`HH:MM`), so full timestamps are
//! accepted too.

use crate::error::ConferenceError;
use crate::types::{SessionType, TeeShirtSize};
use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

/// Fields for creating or updating a conference.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConferenceForm {
    /// Conference name
    pub name: Option<String>,
    /// Description
    pub description: Option<String>,
    /// Topics
    pub topics: Vec<String>,
    /// City
    pub city: Option<String>,
    /// Start date, `YYYY-MM-DD`
    pub start_date: Option<String>,
    /// End date, `YYYY-MM-DD`
    pub end_date: Option<String>,
    /// Capacity
    pub max_attendees: Option<i64>,
}

impl ConferenceForm {
    /// A form with only a name set.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    /// Set the city.
    #[must_use]
    pub fn city(mut self, city: impl Into<String>) -> Self {
        self.city = Some(city.into());
        self
    }

    /// Set the topics.
    #[must_use]
    pub fn topics<I, S>(mut self, topics: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.topics = topics.into_iter().map(Into::into).collect();
        self
    }

    /// Set the start date.
    #[must_use]
    pub fn start_date(mut self, date: impl Into<String>) -> Self {
        self.start_date = Some(date.into());
        self
    }

    /// Set the end date.
    #[must_use]
    pub fn end_date(mut self, date: impl Into<String>) -> Self {
        self.end_date = Some(date.into());
        self
    }

    /// Set the capacity.
    #[must_use]
    pub const fn max_attendees(mut self, max: i64) -> Self {
        self.max_attendees = Some(max);
        self
    }
}

/// Fields for creating a session.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionForm {
    /// Session title
    pub name: Option<String>,
    /// Highlights
    pub highlights: Vec<String>,
    /// Speaker display names
    pub speakers: Vec<String>,
    /// Length, `HH:MM`
    pub duration: Option<String>,
    /// Session type
    pub type_of_session: Option<SessionType>,
    /// Day, `YYYY-MM-DD`
    pub date: Option<String>,
    /// Start time, `HH:MM`
    pub start_time: Option<String>,
}

impl SessionForm {
    /// A form with only a name set.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    /// Set the speakers.
    #[must_use]
    pub fn speakers<I, S>(mut self, speakers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.speakers = speakers.into_iter().map(Into::into).collect();
        self
    }

    /// Set the session type.
    #[must_use]
    pub const fn type_of_session(mut self, kind: SessionType) -> Self {
        self.type_of_session = Some(kind);
        self
    }

    /// Set the date.
    #[must_use]
    pub fn date(mut self, date: impl Into<String>) -> Self {
        self.date = Some(date.into());
        self
    }

    /// Set the start time.
    #[must_use]
    pub fn start_time(mut self, time: impl Into<String>) -> Self {
        self.start_time = Some(time.into());
        self
    }

    /// Set the duration.
    #[must_use]
    pub fn duration(mut self, duration: impl Into<String>) -> Self {
        self.duration = Some(duration.into());
        self
    }
}

/// Editable profile fields.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProfileUpdate {
    /// New display name
    pub display_name: Option<String>,
    /// New t-shirt size
    pub tee_shirt_size: Option<TeeShirtSize>,
}

/// Parse a `YYYY-MM-DD` date from the first ten characters of `raw`.
///
/// # Errors
///
/// Returns `BadRequest` if the prefix is not a valid date.
pub fn parse_date(field: &str, raw: &str) -> Result<NaiveDate, ConferenceError> {
    let raw = raw.trim();
    let prefix = raw.get(..10).unwrap_or(raw);
    NaiveDate::parse_from_str(prefix, "%Y-%m-%d")
        .map_err(|_| ConferenceError::BadRequest(format!("'{field}' must be a YYYY-MM-DD date, got '{raw}'")))
}

/// Parse an `HH:MM` time from the first five characters of `raw`.
///
/// # Errors
///
/// Returns `BadRequest` if the prefix is not a valid time.
pub fn parse_time(field: &str, raw: &str) -> Result<NaiveTime, ConferenceError> {
    let raw = raw.trim();
    let prefix = raw.get(..5).unwrap_or(raw);
    NaiveTime::parse_from_str(prefix, "%H:%M")
        .map_err(|_| ConferenceError::BadRequest(format!("'{field}' must be an HH:MM time, got '{raw}'")))
}

/// Parse an optional date, treating blank input as absent.
pub(crate) fn parse_optional_date(
    field: &str,
    raw: Option<&str>,
) -> Result<Option<NaiveDate>, ConferenceError> {
    raw.filter(|value| !value.trim().is_empty())
        .map(|value| parse_date(field, value))
        .transpose()
}

/// The trimmed value if it is non-blank.
pub(crate) fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}
