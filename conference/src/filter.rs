//! Filter compiler for conference queries.
//!
//! Translates caller-supplied `(field, operator, value)` descriptors into a
//! [`Query`] the store can execute. The store's index model allows an
//! inequality on at most one property, and requires that property to be the
//! first sort key, so the compiler:
//!
//! 1. resolves field and operator names through closed whitelists
//! 2. rejects inequalities on two different fields
//! 3. sorts by the inequality field (if any), then by `name`
//! 4. coerces numeric fields to integers
//! 5. keeps predicates in descriptor order
//!
//! # Example
//!
//! ```
//! use conference::filter::{FilterDescriptor, compile};
//!
//! let query = compile(&[
//!     FilterDescriptor::new("CITY", "EQ", "Paris"),
//!     FilterDescriptor::new("MAX_ATTENDEES", "GT", "50"),
//! ])
//! .unwrap();
//!
//! assert_eq!(
//!     query.to_string(),
//!     r#"SELECT Conference WHERE city = "Paris" AND maxAttendees > 50 ORDER BY maxAttendees, name"#
//! );
//! ```

use crate::error::ConferenceError;
use crate::types::Conference;
use conference_core::entity::Entity;
use conference_core::query::{FieldValue, Operator, Predicate, Query};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Filterable conference fields.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Field {
    /// `CITY` -> `city`
    City,
    /// `TOPIC` -> `topics`
    Topic,
    /// `MONTH` -> `month`
    Month,
    /// `MAX_ATTENDEES` -> `maxAttendees`
    MaxAttendees,
}

impl Field {
    /// Stored property name.
    #[must_use]
    pub const fn property(self) -> &'static str {
        match self {
            Self::City => "city",
            Self::Topic => "topics",
            Self::Month => "month",
            Self::MaxAttendees => "maxAttendees",
        }
    }

    /// True if values must be coerced to integers.
    #[must_use]
    pub const fn is_numeric(self) -> bool {
        matches!(self, Self::Month | Self::MaxAttendees)
    }
}

impl FromStr for Field {
    type Err = ConferenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "CITY" => Ok(Self::City),
            "TOPIC" => Ok(Self::Topic),
            "MONTH" => Ok(Self::Month),
            "MAX_ATTENDEES" => Ok(Self::MaxAttendees),
            other => Err(ConferenceError::InvalidFilter(format!("unknown field '{other}'"))),
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.property())
    }
}

/// Filter operators accepted from callers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FilterOperator {
    /// `EQ`
    Eq,
    /// `GT`
    Gt,
    /// `GTEQ`
    Gteq,
    /// `LT`
    Lt,
    /// `LTEQ`
    Lteq,
    /// `NE`
    Ne,
}

impl FilterOperator {
    /// Store operator.
    #[must_use]
    pub const fn operator(self) -> Operator {
        match self {
            Self::Eq => Operator::Eq,
            Self::Gt => Operator::Gt,
            Self::Gteq => Operator::Ge,
            Self::Lt => Operator::Lt,
            Self::Lteq => Operator::Le,
            Self::Ne => Operator::Ne,
        }
    }
}

impl FromStr for FilterOperator {
    type Err = ConferenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "EQ" => Ok(Self::Eq),
            "GT" => Ok(Self::Gt),
            "GTEQ" => Ok(Self::Gteq),
            "LT" => Ok(Self::Lt),
            "LTEQ" => Ok(Self::Lteq),
            "NE" => Ok(Self::Ne),
            other => Err(ConferenceError::InvalidFilter(format!("unknown operator '{other}'"))),
        }
    }
}

/// One filter as submitted by a caller.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterDescriptor {
    /// Field name (`CITY`, `TOPIC`, `MONTH`, `MAX_ATTENDEES`)
    pub field: String,
    /// Operator name (`EQ`, `GT`, `GTEQ`, `LT`, `LTEQ`, `NE`)
    pub operator: String,
    /// Raw value
    pub value: String,
}

impl FilterDescriptor {
    /// Create a descriptor.
    #[must_use]
    pub fn new(field: impl Into<String>, operator: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            operator: operator.into(),
            value: value.into(),
        }
    }
}

/// A descriptor after whitelist resolution.
#[derive(Clone, Debug, PartialEq, Eq)]
struct ResolvedFilter {
    field: Field,
    operator: Operator,
    value: FieldValue,
}

impl ResolvedFilter {
    fn resolve(descriptor: &FilterDescriptor) -> Result<Self, ConferenceError> {
        let field: Field = descriptor.field.parse()?;
        let operator = descriptor.operator.parse::<FilterOperator>()?.operator();

        let value = if field.is_numeric() {
            let raw = descriptor.value.trim();
            raw.parse::<i64>()
                .map(FieldValue::Int)
                .map_err(|_| ConferenceError::InvalidFilterValue {
                    field: field.property().to_string(),
                    value: descriptor.value.clone(),
                })?
        } else {
            FieldValue::Text(descriptor.value.clone())
        };

        Ok(Self {
            field,
            operator,
            value,
        })
    }
}

/// Compile filter descriptors into a conference query.
///
/// # Errors
///
/// - `InvalidFilter` for an unknown field or operator
/// - `InvalidFilterValue` for a non-integer value on a numeric field
/// - `UnsupportedFilterCombination` for inequalities on two fields
pub fn compile(descriptors: &[FilterDescriptor]) -> Result<Query, ConferenceError> {
    let mut inequality_field: Option<Field> = None;
    let mut predicates = Vec::with_capacity(descriptors.len());

    for descriptor in descriptors {
        let filter = ResolvedFilter::resolve(descriptor)?;

        if filter.operator.is_inequality() {
            match inequality_field {
                Some(existing) if existing != filter.field => {
                    return Err(ConferenceError::UnsupportedFilterCombination {
                        first: existing.property().to_string(),
                        second: filter.field.property().to_string(),
                    });
                },
                _ => inequality_field = Some(filter.field),
            }
        }

        predicates.push(Predicate::new(filter.field.property(), filter.operator, filter.value));
    }

    let mut query = Query::new(Conference::KIND);
    if let Some(field) = inequality_field {
        query = query.order_by(field.property());
    }
    query = query.order_by("name");

    let query = predicates
        .into_iter()
        .fold(query, Query::with_predicate);

    tracing::debug!(%query, "Compiled conference filters");
    Ok(query)
}
