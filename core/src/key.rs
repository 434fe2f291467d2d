//! Entity identification and versioning types.
//!
//! Every entity in the store is addressed by an [`EntityKey`]: a kind, an id
//! (numeric or named), and an optional parent key. Parent keys express
//! ownership (a conference belongs to its organizer's profile, a session
//! belongs to its conference) and are the basis for ancestor queries.
//!
//! Keys have two textual forms:
//!
//! - [`Display`](std::fmt::Display): a readable path such as
//!   `Profile:"alice"/Conference:7`, for logs.
//! - [`EntityKey::urlsafe`]: an opaque, URL-safe token handed to clients and
//!   parsed back with [`EntityKey::from_urlsafe`].

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error returned when a client-supplied key token cannot be decoded.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid entity key: {0}")]
pub struct ParseKeyError(String);

/// The id component of an [`EntityKey`].
///
/// Store-allocated ids are numeric; natural keys (user ids, normalized
/// speaker names) are named.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KeyId {
    /// Id allocated by the store
    Int(i64),
    /// Caller-chosen natural id
    Name(String),
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(id) => write!(f, "{id}"),
            Self::Name(name) => write!(f, "{name:?}"),
        }
    }
}

impl From<i64> for KeyId {
    fn from(id: i64) -> Self {
        Self::Int(id)
    }
}

impl From<&str> for KeyId {
    fn from(name: &str) -> Self {
        Self::Name(name.to_string())
    }
}

impl From<String> for KeyId {
    fn from(name: String) -> Self {
        Self::Name(name)
    }
}

/// Unique identifier for an entity.
///
/// # Examples
///
/// ```
/// use conference_core::key::EntityKey;
///
/// let owner = EntityKey::named("Profile", "alice");
/// let conference = EntityKey::numeric("Conference", 7).with_parent(owner.clone());
///
/// assert_eq!(conference.parent(), Some(&owner));
/// assert!(conference.is_descendant_of(&owner));
///
/// let token = conference.urlsafe();
/// assert_eq!(EntityKey::from_urlsafe(&token).unwrap(), conference);
/// ```
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityKey {
    parent: Option<Box<EntityKey>>,
    kind: String,
    id: KeyId,
}

impl EntityKey {
    /// Create a root key.
    #[must_use]
    pub fn new(kind: impl Into<String>, id: impl Into<KeyId>) -> Self {
        Self {
            parent: None,
            kind: kind.into(),
            id: id.into(),
        }
    }

    /// Create a root key with a named id.
    #[must_use]
    pub fn named(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(kind, KeyId::Name(name.into()))
    }

    /// Create a root key with a numeric id.
    #[must_use]
    pub fn numeric(kind: impl Into<String>, id: i64) -> Self {
        Self::new(kind, KeyId::Int(id))
    }

    /// Attach a parent key, making this key part of the parent's entity group.
    #[must_use]
    pub fn with_parent(mut self, parent: EntityKey) -> Self {
        self.parent = Some(Box::new(parent));
        self
    }

    /// The entity kind.
    #[must_use]
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// The id within the kind (and parent).
    #[must_use]
    pub const fn id(&self) -> &KeyId {
        &self.id
    }

    /// The named id, if this key has one.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        match &self.id {
            KeyId::Name(name) => Some(name),
            KeyId::Int(_) => None,
        }
    }

    /// The parent key, if any.
    #[must_use]
    pub fn parent(&self) -> Option<&EntityKey> {
        self.parent.as_deref()
    }

    /// True if `ancestor` equals this key or any of its parents.
    #[must_use]
    pub fn is_descendant_of(&self, ancestor: &EntityKey) -> bool {
        let mut current = Some(self);
        while let Some(key) = current {
            if key == ancestor {
                return true;
            }
            current = key.parent();
        }
        false
    }

    /// Encode this key as an opaque URL-safe token.
    #[must_use]
    pub fn urlsafe(&self) -> String {
        // Serializing a tree of strings and integers cannot fail.
        let bytes = serde_json::to_vec(self).unwrap_or_default();
        URL_SAFE_NO_PAD.encode(bytes)
    }

    /// Decode a token produced by [`EntityKey::urlsafe`].
    ///
    /// # Errors
    ///
    /// Returns [`ParseKeyError`] if the token is not valid base64 or does not
    /// decode to a key.
    pub fn from_urlsafe(token: &str) -> Result<Self, ParseKeyError> {
        if token.is_empty() {
            return Err(ParseKeyError("key token cannot be empty".to_string()));
        }
        let bytes = URL_SAFE_NO_PAD
            .decode(token)
            .map_err(|e| ParseKeyError(format!("{token}: {e}")))?;
        serde_json::from_slice(&bytes).map_err(|e| ParseKeyError(format!("{token}: {e}")))
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(parent) = &self.parent {
            write!(f, "{parent}/")?;
        }
        write!(f, "{}:{}", self.kind, self.id)
    }
}

impl FromStr for EntityKey {
    type Err = ParseKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_urlsafe(s)
    }
}

/// Version number of a stored entity, used for optimistic concurrency control.
///
/// Every committed write bumps the entity's version by one. Transactions
/// remember the version they read and the store rejects the commit if the
/// entity moved on in the meantime.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Version(u64);

impl Version {
    /// Create a new version.
    #[must_use]
    pub const fn new(version: u64) -> Self {
        Self(version)
    }

    /// Get the version number.
    #[must_use]
    pub const fn value(&self) -> u64 {
        self.0
    }

    /// The version following this one.
    #[must_use]
    pub const fn next(&self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Version {
    fn from(v: u64) -> Self {
        Self(v)
    }
}
