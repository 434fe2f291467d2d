//! Conference Central - conference management on an optimistic entity store
//!
//! Organizers publish conferences and sessions; attendees register for
//! conferences, wishlist sessions, and browse conferences with filters.
//!
//! - **Seat reservation**: [`registration`] moves a user onto or off a
//!   conference's attendee list and adjusts `seats_available` in the same
//!   transaction. Concurrent registrations for the last seat cannot both win.
//! - **Filter compiler**: [`filter`] turns `(field, operator, value)` triples
//!   into a store query, rejecting combinations the index model cannot serve.
//! - **Announcements**: [`announcement`] keeps a cached "nearly sold out"
//!   message refreshed in the background.
//!
//! # Architecture
//!
//! ```text
//!   caller (identity resolved)
//!        │
//!        ▼
//! ┌──────────────┐   load    ┌──────────────┐   reduce   ┌──────────────┐
//! │   Manager    │ ────────▶ │ Transaction  │ ─────────▶ │   Reducer    │
//! │ (retry loop) │ ◀──────── │ (versions)   │ ◀───────── │   (pure)     │
//! └──────────────┘  commit   └──────────────┘   state    └──────────────┘
//!        │
//!        ▼ after commit
//! ┌──────────────┐
//! │   Effects    │ ──▶ TaskDispatcher
//! └──────────────┘
//! ```
//!
//! Every service takes `Option<&Identity>`; `None` is rejected with
//! [`ConferenceError::Unauthorized`].

pub mod announcement;
pub mod app;
pub mod conferences;
pub mod config;
pub mod error;
pub mod filter;
pub mod forms;
pub mod profiles;
pub mod registration;
pub mod sessions;
pub mod tasks;
pub mod types;
pub mod wishlist;

mod transactional;

pub use announcement::AnnouncementCache;
pub use app::ConferenceApp;
pub use conferences::ConferenceService;
pub use config::{Config, ConfigError};
pub use error::{ConferenceError, ConflictReason, ErrorKind};
pub use filter::FilterDescriptor;
pub use profiles::ProfileService;
pub use registration::{RegistrationManager, RegistrationOutcome};
pub use sessions::SessionService;
pub use types::{Conference, Identity, Profile, Session, SessionType, Speaker, TeeShirtSize};
pub use wishlist::WishlistManager;
