//! Conference service.
//!
//! Creation, owner-only updates, and the conference listings. Conferences are
//! stored under their organizer's profile key so "created by me" is an
//! ancestor query.

use crate::error::ConferenceError;
use crate::filter::{self, FilterDescriptor};
use crate::forms::{ConferenceForm, non_blank, parse_optional_date};
use crate::profiles::require_identity;
use crate::tasks::{self, SEND_CONFIRMATION_EMAIL};
use crate::transactional::with_retries;
use crate::types::{Conference, Identity, Profile};
use chrono::{Datelike, NaiveDate};
use conference_core::dispatcher::{Task, TaskDispatcher};
use conference_core::entity::{Document, Entity};
use conference_core::entity_store::EntityStore;
use conference_core::environment::Clock;
use conference_core::key::EntityKey;
use conference_core::query::{Operator, Query};
use conference_core::transaction::Transaction;
use conference_runtime::retry::RetryPolicy;
use std::sync::Arc;

/// City used when a form omits one.
pub const DEFAULT_CITY: &str = "Default City";

/// Topics used when a form omits them.
pub const DEFAULT_TOPICS: [&str; 2] = ["Default", "Topic"];

/// Publishes and lists conferences.
#[derive(Clone)]
pub struct ConferenceService {
    store: Arc<dyn EntityStore>,
    dispatcher: Arc<dyn TaskDispatcher>,
    clock: Arc<dyn Clock>,
    policy: RetryPolicy,
}

impl ConferenceService {
    /// Create a service.
    #[must_use]
    pub fn new(
        store: Arc<dyn EntityStore>,
        dispatcher: Arc<dyn TaskDispatcher>,
        clock: Arc<dyn Clock>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            store,
            dispatcher,
            clock,
            policy,
        }
    }

    // ========== Commands ==========

    /// Publish a conference organized by the caller.
    ///
    /// Missing fields take defaults. Seats start equal to capacity. Once the
    /// conference is stored a confirmation email task is enqueued for the
    /// organizer.
    ///
    /// # Errors
    ///
    /// `Unauthorized` without an identity; `BadRequest` for a missing name,
    /// a malformed date or a negative capacity.
    #[tracing::instrument(skip_all)]
    pub async fn create_conference(
        &self,
        identity: Option<&Identity>,
        form: ConferenceForm,
    ) -> Result<Conference, ConferenceError> {
        let identity = require_identity(identity)?;
        let name = non_blank(form.name.as_deref())
            .ok_or_else(|| ConferenceError::BadRequest("Conference 'name' field required".to_string()))?
            .to_string();

        let start_date = parse_optional_date("startDate", form.start_date.as_deref())?;
        let end_date = parse_optional_date("endDate", form.end_date.as_deref())?;
        let max_attendees = form.max_attendees.unwrap_or(0);
        if max_attendees < 0 {
            return Err(ConferenceError::BadRequest(
                "'maxAttendees' must not be negative".to_string(),
            ));
        }
        let topics = if form.topics.is_empty() {
            DEFAULT_TOPICS.iter().map(ToString::to_string).collect()
        } else {
            form.topics
        };

        let profile_key = identity.profile_key();
        self.ensure_profile(identity).await?;
        let key = self
            .store
            .allocate_key(Conference::KIND.to_string(), Some(profile_key))
            .await?;

        let conference = Conference {
            key,
            name,
            description: form.description,
            organizer_user_id: identity.user_id.clone(),
            topics,
            city: non_blank(form.city.as_deref()).unwrap_or(DEFAULT_CITY).to_string(),
            start_date,
            end_date,
            month: month_of(start_date),
            max_attendees,
            seats_available: max_attendees,
        };
        self.store.put(Document::from_entity(&conference)?).await?;
        tracing::info!(conference = %conference.key, name = %conference.name, "Conference created");

        let info = serde_json::to_string(&conference).unwrap_or_else(|_| conference.name.clone());
        let task = Task::new(SEND_CONFIRMATION_EMAIL, self.clock.now())
            .param("email", identity.email.clone())
            .param("conferenceInfo", info);
        tasks::dispatch_after_commit(Arc::clone(&self.dispatcher), task, self.policy.clone()).await;

        Ok(conference)
    }

    /// Update the provided fields of a conference the caller organizes.
    ///
    /// A new start date also updates `month`. Changing the capacity moves
    /// `seats_available` by the same amount so the attendee count is kept.
    ///
    /// # Errors
    ///
    /// `Unauthorized`, `NotFound`, `Forbidden` for a non-organizer,
    /// `BadRequest` for malformed input or a capacity below the attendee
    /// count, `TransientStoreContention` if retries run out.
    #[tracing::instrument(skip_all, fields(conference = %key))]
    pub async fn update_conference(
        &self,
        identity: Option<&Identity>,
        key: &EntityKey,
        form: ConferenceForm,
    ) -> Result<Conference, ConferenceError> {
        let identity = require_identity(identity)?;
        let conference = with_retries(&self.policy, || self.apply_update(identity, key, &form)).await?;
        tracing::info!(conference = %key, "Conference updated");
        Ok(conference)
    }

    async fn apply_update(
        &self,
        identity: &Identity,
        key: &EntityKey,
        form: &ConferenceForm,
    ) -> Result<Conference, ConferenceError> {
        let mut txn = Transaction::begin(Arc::clone(&self.store));
        let mut conference = txn
            .get::<Conference>(key)
            .await?
            .ok_or_else(|| ConferenceError::conference_not_found(key.clone()))?;

        if !conference.is_organized_by(&identity.user_id) {
            return Err(ConferenceError::Forbidden(
                "Only the owner can update the conference.".to_string(),
            ));
        }

        if let Some(name) = non_blank(form.name.as_deref()) {
            conference.name = name.to_string();
        }
        if let Some(description) = non_blank(form.description.as_deref()) {
            conference.description = Some(description.to_string());
        }
        if !form.topics.is_empty() {
            conference.topics.clone_from(&form.topics);
        }
        if let Some(city) = non_blank(form.city.as_deref()) {
            conference.city = city.to_string();
        }
        if let Some(start) = parse_optional_date("startDate", form.start_date.as_deref())? {
            conference.start_date = Some(start);
            conference.month = month_of(Some(start));
        }
        if let Some(end) = parse_optional_date("endDate", form.end_date.as_deref())? {
            conference.end_date = Some(end);
        }
        if let Some(max) = form.max_attendees {
            let attendees = conference.attendee_count();
            if max < attendees {
                return Err(ConferenceError::BadRequest(format!(
                    "'maxAttendees' cannot drop below the {attendees} registered attendees"
                )));
            }
            conference.max_attendees = max;
            conference.seats_available = max - attendees;
        }

        txn.put(&conference)?;
        txn.commit().await?;
        Ok(conference)
    }

    async fn ensure_profile(&self, identity: &Identity) -> Result<(), ConferenceError> {
        let fresh = Document::from_entity(&Profile::new(identity))?;
        self.store.get_or_insert(fresh).await?;
        Ok(())
    }

    // ========== Queries ==========

    /// A conference by key.
    ///
    /// # Errors
    ///
    /// `NotFound` if it does not exist.
    pub async fn get_conference(&self, key: &EntityKey) -> Result<Conference, ConferenceError> {
        let found = self
            .store
            .get(key.clone())
            .await?
            .ok_or_else(|| ConferenceError::conference_not_found(key.clone()))?;
        Ok(found.document.to_entity()?)
    }

    /// Conferences organized by the caller.
    ///
    /// # Errors
    ///
    /// `Unauthorized` without an identity; store failures otherwise.
    pub async fn conferences_created(
        &self,
        identity: Option<&Identity>,
    ) -> Result<Vec<Conference>, ConferenceError> {
        let identity = require_identity(identity)?;
        let query = Query::new(Conference::KIND)
            .ancestor(identity.profile_key())
            .order_by("name");
        self.run(query).await
    }

    /// Conferences covering `topic`, sorted by name.
    ///
    /// # Errors
    ///
    /// `BadRequest` for a blank topic.
    pub async fn conferences_by_topic(&self, topic: &str) -> Result<Vec<Conference>, ConferenceError> {
        let topic = non_blank(Some(topic))
            .ok_or_else(|| ConferenceError::BadRequest("'topic' field required".to_string()))?;
        let query = Query::new(Conference::KIND)
            .filter("topics", Operator::Eq, topic)
            .order_by("name");
        self.run(query).await
    }

    /// Conferences the caller registered for, in registration order.
    ///
    /// # Errors
    ///
    /// `Unauthorized` without an identity; store failures otherwise.
    pub async fn conferences_to_attend(
        &self,
        identity: Option<&Identity>,
    ) -> Result<Vec<Conference>, ConferenceError> {
        let identity = require_identity(identity)?;
        let Some(found) = self.store.get(identity.profile_key()).await? else {
            return Ok(Vec::new());
        };
        let profile: Profile = found.document.to_entity()?;

        let mut conferences = Vec::with_capacity(profile.conference_keys_to_attend.len());
        for key in profile.conference_keys_to_attend {
            if let Some(found) = self.store.get(key).await? {
                conferences.push(found.document.to_entity()?);
            }
        }
        Ok(conferences)
    }

    /// Conferences matching caller-supplied filters.
    ///
    /// # Errors
    ///
    /// Filter compilation errors; store failures.
    pub async fn query_conferences(
        &self,
        filters: &[FilterDescriptor],
    ) -> Result<Vec<Conference>, ConferenceError> {
        let query = filter::compile(filters)?;
        self.run(query).await
    }

    async fn run(&self, query: Query) -> Result<Vec<Conference>, ConferenceError> {
        tracing::debug!(%query, "Querying conferences");
        self.store
            .query(query)
            .await?
            .iter()
            .map(|doc| doc.to_entity().map_err(ConferenceError::from))
            .collect()
    }
}

impl std::fmt::Debug for ConferenceService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConferenceService")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

/// Month number of `date`, or 0.
fn month_of(date: Option<NaiveDate>) -> i64 {
    date.map_or(0, |date| i64::from(date.month()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use conference_testing::mocks::{InMemoryEntityStore, RecordingDispatcher, test_clock};

    struct Fixture {
        store: Arc<InMemoryEntityStore>,
        dispatcher: Arc<RecordingDispatcher>,
        service: ConferenceService,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(InMemoryEntityStore::new());
        let dispatcher = Arc::new(RecordingDispatcher::new());
        let service = ConferenceService::new(
            store.clone(),
            dispatcher.clone(),
            Arc::new(test_clock()),
            RetryPolicy::default(),
        );
        Fixture {
            store,
            dispatcher,
            service,
        }
    }

    fn org() -> Identity {
        Identity::new("org", "org@example.com")
    }

    #[tokio::test]
    async fn create_applies_defaults() {
        let f = fixture();
        let conf = f
            .service
            .create_conference(Some(&org()), ConferenceForm::named("RustConf"))
            .await
            .unwrap();

        assert_eq!(conf.city, DEFAULT_CITY);
        assert_eq!(conf.topics, vec!["Default", "Topic"]);
        assert_eq!(conf.max_attendees, 0);
        assert_eq!(conf.seats_available, 0);
        assert_eq!(conf.month, 0);
        assert_eq!(conf.key.parent(), Some(&org().profile_key()));
        assert!(f.store.load::<Profile>(&org().profile_key()).unwrap().is_some());
    }

    #[tokio::test]
    async fn create_derives_month_and_seats() {
        let f = fixture();
        let conf = f
            .service
            .create_conference(
                Some(&org()),
                ConferenceForm::named("RustConf")
                    .city("Paris")
                    .start_date("2026-09-14T00:00:00")
                    .max_attendees(120),
            )
            .await
            .unwrap();

        assert_eq!(conf.month, 9);
        assert_eq!(conf.seats_available, 120);
        assert_eq!(f.service.get_conference(&conf.key).await.unwrap(), conf);
    }

    #[tokio::test]
    async fn create_enqueues_confirmation_after_storing() {
        let f = fixture();
        let conf = f
            .service
            .create_conference(Some(&org()), ConferenceForm::named("RustConf"))
            .await
            .unwrap();

        let tasks = f.dispatcher.tasks_named(SEND_CONFIRMATION_EMAIL);
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].params["email"], "org@example.com");
        assert!(tasks[0].params["conferenceInfo"].contains("RustConf"));
        assert_eq!(tasks[0].enqueued_at, test_clock().now());
        assert!(f.store.load::<Conference>(&conf.key).unwrap().is_some());
    }

    #[tokio::test]
    async fn create_does_not_wait_for_dispatch_retries() {
        let store = Arc::new(InMemoryEntityStore::new());
        let dispatcher = Arc::new(RecordingDispatcher::new());
        dispatcher.reject_next(usize::MAX);
        let slow = RetryPolicy::builder()
            .max_retries(10)
            .initial_delay(std::time::Duration::from_secs(5))
            .max_delay(std::time::Duration::from_secs(5))
            .build();
        let service = ConferenceService::new(store.clone(), dispatcher.clone(), Arc::new(test_clock()), slow);

        let created = tokio::time::timeout(
            std::time::Duration::from_secs(1),
            service.create_conference(Some(&org()), ConferenceForm::named("RustConf")),
        )
        .await
        .expect("create returned before the retry schedule")
        .unwrap();

        assert!(store.load::<Conference>(&created.key).unwrap().is_some());
        assert!(dispatcher.tasks().is_empty());
    }

    #[tokio::test]
    async fn create_requires_a_name() {
        let f = fixture();
        let err = f
            .service
            .create_conference(Some(&org()), ConferenceForm::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ConferenceError::BadRequest(_)));
        assert!(f.dispatcher.tasks().is_empty());
    }

    #[tokio::test]
    async fn update_is_owner_only() {
        let f = fixture();
        let conf = f
            .service
            .create_conference(Some(&org()), ConferenceForm::named("RustConf"))
            .await
            .unwrap();
        let mallory = Identity::new("mallory", "m@example.com");

        let err = f
            .service
            .update_conference(Some(&mallory), &conf.key, ConferenceForm::named("Mine"))
            .await
            .unwrap_err();
        assert!(matches!(err, ConferenceError::Forbidden(_)));
    }

    #[tokio::test]
    async fn update_copies_provided_fields_and_keeps_attendees() {
        let f = fixture();
        let mut conf = f
            .service
            .create_conference(Some(&org()), ConferenceForm::named("RustConf").max_attendees(10))
            .await
            .unwrap();
        conf.seats_available = 7;
        f.store.seed(&conf).unwrap();

        let updated = f
            .service
            .update_conference(
                Some(&org()),
                &conf.key,
                ConferenceForm::default().start_date("2026-03-02").max_attendees(20),
            )
            .await
            .unwrap();

        assert_eq!(updated.name, "RustConf");
        assert_eq!(updated.month, 3);
        assert_eq!(updated.max_attendees, 20);
        assert_eq!(updated.seats_available, 17);

        let err = f
            .service
            .update_conference(Some(&org()), &conf.key, ConferenceForm::default().max_attendees(2))
            .await
            .unwrap_err();
        assert!(matches!(err, ConferenceError::BadRequest(_)));
    }

    #[tokio::test]
    async fn listings() {
        let f = fixture();
        let other = Identity::new("other", "other@example.com");
        for (who, name, topic) in [
            (org(), "Zeta", "Rust"),
            (org(), "Alpha", "Go"),
            (other.clone(), "Mid", "Rust"),
        ] {
            f.service
                .create_conference(Some(&who), ConferenceForm::named(name).topics([topic]))
                .await
                .unwrap();
        }

        let created: Vec<String> = f
            .service
            .conferences_created(Some(&org()))
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(created, vec!["Alpha", "Zeta"]);

        let rust: Vec<String> = f
            .service
            .conferences_by_topic("Rust")
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(rust, vec!["Mid", "Zeta"]);

        assert!(matches!(
            f.service.conferences_by_topic(" ").await,
            Err(ConferenceError::BadRequest(_))
        ));
        assert!(f.service.conferences_to_attend(Some(&other)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_conference_is_not_found() {
        let f = fixture();
        let err = f
            .service
            .get_conference(&EntityKey::numeric("Conference", 42))
            .await
            .unwrap_err();
        assert!(matches!(err, ConferenceError::NotFound { kind: "conference", .. }));
    }
}
