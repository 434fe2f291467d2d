//! Session service and featured speakers.

use crate::error::ConferenceError;
use crate::forms::{SessionForm, non_blank, parse_date, parse_time};
use crate::profiles::require_identity;
use crate::tasks::{self, FEATURED_SPEAKER};
use crate::types::{Conference, Identity, Session, SessionType, Speaker, normalize_speaker_name};
use chrono::{NaiveDate, NaiveTime};
use conference_core::cache::CacheService;
use conference_core::dispatcher::{Task, TaskDispatcher};
use conference_core::entity::{Document, Entity};
use conference_core::entity_store::EntityStore;
use conference_core::environment::Clock;
use conference_core::key::EntityKey;
use conference_core::query::{Operator, Query};
use conference_runtime::retry::RetryPolicy;
use std::collections::HashMap;
use std::sync::Arc;

/// Sessions starting at or after this time are excluded by
/// [`SessionService::query_problem`].
const EVENING: &str = "19:00:00";

/// Cache key holding the featured speaker of `conference`.
#[must_use]
pub fn featured_speaker_cache_key(conference: &EntityKey) -> String {
    format!("FEATURED_SPEAKER_{}", conference.urlsafe())
}

/// Creates and lists sessions.
#[derive(Clone)]
pub struct SessionService {
    store: Arc<dyn EntityStore>,
    cache: Arc<dyn CacheService>,
    dispatcher: Arc<dyn TaskDispatcher>,
    clock: Arc<dyn Clock>,
    policy: RetryPolicy,
}

impl SessionService {
    /// Create a service.
    #[must_use]
    pub fn new(
        store: Arc<dyn EntityStore>,
        cache: Arc<dyn CacheService>,
        dispatcher: Arc<dyn TaskDispatcher>,
        clock: Arc<dyn Clock>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            store,
            cache,
            dispatcher,
            clock,
            policy,
        }
    }

    // ========== Commands ==========

    /// Add a session to a conference the caller organizes.
    ///
    /// Speakers are deduplicated by normalized name. Once the session is
    /// stored a `featured_speaker` task is enqueued for the conference.
    ///
    /// # Errors
    ///
    /// `Unauthorized`, `NotFound`, `Forbidden` for a non-organizer,
    /// `BadRequest` for a missing name or malformed date/time.
    #[tracing::instrument(skip_all, fields(conference = %conference_key))]
    pub async fn create_session(
        &self,
        identity: Option<&Identity>,
        conference_key: &EntityKey,
        form: SessionForm,
    ) -> Result<Session, ConferenceError> {
        let identity = require_identity(identity)?;
        let conference = self.load_conference(conference_key).await?;
        if !conference.is_organized_by(&identity.user_id) {
            return Err(ConferenceError::Forbidden(
                "Only the owner can add sessions to the conference.".to_string(),
            ));
        }

        let name = non_blank(form.name.as_deref())
            .ok_or_else(|| ConferenceError::BadRequest("Session 'name' field required".to_string()))?
            .to_string();
        let duration = match non_blank(form.duration.as_deref()) {
            Some(raw) => parse_time("duration", raw)?,
            None => NaiveTime::from_hms_opt(1, 0, 0).unwrap_or_default(),
        };
        let date = match non_blank(form.date.as_deref()) {
            Some(raw) => parse_date("date", raw)?,
            None => NaiveDate::default(),
        };
        let start_time = match non_blank(form.start_time.as_deref()) {
            Some(raw) => parse_time("startTime", raw)?,
            None => NaiveTime::from_hms_opt(9, 0, 0).unwrap_or_default(),
        };

        let mut speakers: Vec<EntityKey> = Vec::with_capacity(form.speakers.len());
        for raw in &form.speakers {
            if raw.trim().is_empty() {
                continue;
            }
            let speaker = self.speaker_for(raw).await?;
            if !speakers.contains(&speaker.key) {
                speakers.push(speaker.key);
            }
        }

        let key = self
            .store
            .allocate_key(Session::KIND.to_string(), Some(conference.key.clone()))
            .await?;
        let session = Session {
            key,
            name,
            highlights: form.highlights,
            speakers,
            duration,
            type_of_session: form.type_of_session.unwrap_or_default(),
            date,
            start_time,
        };
        self.store.put(Document::from_entity(&session)?).await?;
        tracing::info!(session = %session.key, name = %session.name, "Session created");

        let task = Task::new(FEATURED_SPEAKER, self.clock.now()).param("conf_key", conference.key.urlsafe());
        tasks::dispatch_after_commit(Arc::clone(&self.dispatcher), task, self.policy.clone()).await;

        Ok(session)
    }

    /// Recompute and cache the featured speaker of a conference.
    ///
    /// The speaker with the most sessions wins, ties going to the smaller
    /// normalized name. A speaker with a single session is never featured;
    /// in that case the cache entry is cleared and `None` returned.
    ///
    /// # Errors
    ///
    /// Store failures.
    pub async fn recompute_featured_speaker(
        &self,
        conference: &EntityKey,
    ) -> Result<Option<String>, ConferenceError> {
        let sessions = self.conference_sessions(conference).await?;

        let mut counts: HashMap<&EntityKey, usize> = HashMap::new();
        for session in &sessions {
            for speaker in &session.speakers {
                *counts.entry(speaker).or_default() += 1;
            }
        }
        let featured = counts
            .into_iter()
            .filter(|(_, count)| *count > 1)
            .min_by(|(a_key, a_count), (b_key, b_count)| b_count.cmp(a_count).then_with(|| a_key.cmp(b_key)))
            .map(|(key, _)| key.clone());

        let cache_key = featured_speaker_cache_key(conference);
        let Some(speaker_key) = featured else {
            self.cache.delete(&cache_key);
            return Ok(None);
        };

        let speaker: Speaker = match self.store.get(speaker_key.clone()).await? {
            Some(found) => found.document.to_entity()?,
            None => Speaker {
                name: speaker_key.name().unwrap_or_default().to_string(),
                key: speaker_key.clone(),
            },
        };
        let titles: Vec<&str> = sessions
            .iter()
            .filter(|session| session.speakers.contains(&speaker_key))
            .map(|session| session.name.as_str())
            .collect();

        let text = format!("Featured speaker: {}. Sessions: {}", speaker.name, titles.join(", "));
        self.cache.set(&cache_key, text.clone());
        tracing::info!(%conference, speaker = %speaker.name, "Featured speaker updated");
        Ok(Some(text))
    }

    /// The cached featured speaker text for a conference, or `""`.
    #[must_use]
    pub fn featured_speaker(&self, conference: &EntityKey) -> String {
        self.cache
            .get(&featured_speaker_cache_key(conference))
            .unwrap_or_default()
    }

    // ========== Queries ==========

    /// Every session of a conference.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown conference.
    pub async fn conference_sessions(&self, conference: &EntityKey) -> Result<Vec<Session>, ConferenceError> {
        self.load_conference(conference).await?;
        self.run(Query::new(Session::KIND).ancestor(conference.clone())).await
    }

    /// Sessions of a conference with the given type.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown conference.
    pub async fn conference_sessions_by_type(
        &self,
        conference: &EntityKey,
        kind: SessionType,
    ) -> Result<Vec<Session>, ConferenceError> {
        self.load_conference(conference).await?;
        let query = Query::new(Session::KIND)
            .ancestor(conference.clone())
            .filter("typeOfSession", Operator::Eq, kind.as_str());
        self.run(query).await
    }

    /// Sessions given by a speaker, across all conferences.
    ///
    /// # Errors
    ///
    /// `BadRequest` for a blank name.
    pub async fn sessions_by_speaker(&self, name: &str) -> Result<Vec<Session>, ConferenceError> {
        if name.trim().is_empty() {
            return Err(ConferenceError::BadRequest("'speaker' field required".to_string()));
        }
        let query = Query::new(Session::KIND).filter("speakers", Operator::Eq, Speaker::key_for(name));
        self.run(query).await
    }

    /// Distinct speakers of a conference, in order of first appearance.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown conference.
    pub async fn conference_speakers(&self, conference: &EntityKey) -> Result<Vec<Speaker>, ConferenceError> {
        let sessions = self.conference_sessions(conference).await?;
        let mut keys: Vec<EntityKey> = Vec::new();
        for key in sessions.into_iter().flat_map(|session| session.speakers) {
            if !keys.contains(&key) {
                keys.push(key);
            }
        }

        let mut speakers = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(found) = self.store.get(key).await? {
                speakers.push(found.document.to_entity()?);
            }
        }
        Ok(speakers)
    }

    /// Sessions that start before 19:00 and are not workshops.
    ///
    /// The store allows one inequality per query, so the start-time bound is
    /// queried and the type is filtered afterwards.
    ///
    /// # Errors
    ///
    /// Store failures.
    pub async fn query_problem(&self) -> Result<Vec<Session>, ConferenceError> {
        let query = Query::new(Session::KIND)
            .filter("startTime", Operator::Lt, EVENING)
            .order_by("startTime");
        let sessions = self.run(query).await?;
        Ok(sessions
            .into_iter()
            .filter(|session| session.type_of_session != SessionType::Workshop)
            .collect())
    }

    // ========== Helpers ==========

    async fn load_conference(&self, key: &EntityKey) -> Result<Conference, ConferenceError> {
        let found = self
            .store
            .get(key.clone())
            .await?
            .ok_or_else(|| ConferenceError::conference_not_found(key.clone()))?;
        Ok(found.document.to_entity()?)
    }

    async fn speaker_for(&self, name: &str) -> Result<Speaker, ConferenceError> {
        tracing::debug!(normalized = %normalize_speaker_name(name), "Resolving speaker");
        let stored = self
            .store
            .get_or_insert(Document::from_entity(&Speaker::new(name))?)
            .await?;
        Ok(stored.to_entity()?)
    }

    async fn run(&self, query: Query) -> Result<Vec<Session>, ConferenceError> {
        tracing::debug!(%query, "Querying sessions");
        self.store
            .query(query)
            .await?
            .iter()
            .map(|doc| doc.to_entity().map_err(ConferenceError::from))
            .collect()
    }
}

impl std::fmt::Debug for SessionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionService")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conference_runtime::MemoryCache;
    use conference_testing::mocks::{InMemoryEntityStore, RecordingDispatcher, test_clock};

    struct Fixture {
        store: Arc<InMemoryEntityStore>,
        dispatcher: Arc<RecordingDispatcher>,
        service: SessionService,
        conference: Conference,
    }

    fn org() -> Identity {
        Identity::new("org", "org@example.com")
    }

    fn fixture() -> Fixture {
        let store = Arc::new(InMemoryEntityStore::new());
        let dispatcher = Arc::new(RecordingDispatcher::new());
        let conference = Conference {
            key: EntityKey::numeric("Conference", 1).with_parent(org().profile_key()),
            name: "RustConf".into(),
            description: None,
            organizer_user_id: "org".into(),
            topics: Vec::new(),
            city: "Paris".into(),
            start_date: None,
            end_date: None,
            month: 0,
            max_attendees: 10,
            seats_available: 10,
        };
        store.seed(&conference).unwrap();
        let service = SessionService::new(
            store.clone(),
            Arc::new(MemoryCache::new()),
            dispatcher.clone(),
            Arc::new(test_clock()),
            RetryPolicy::default(),
        );
        Fixture {
            store,
            dispatcher,
            service,
            conference,
        }
    }

    async fn add(f: &Fixture, form: SessionForm) -> Session {
        f.service
            .create_session(Some(&org()), &f.conference.key, form)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn create_applies_defaults_and_enqueues_featured_speaker() {
        let f = fixture();
        let session = add(&f, SessionForm::named("Intro")).await;

        assert_eq!(session.duration, NaiveTime::from_hms_opt(1, 0, 0).unwrap());
        assert_eq!(session.start_time, NaiveTime::from_hms_opt(9, 0, 0).unwrap());
        assert_eq!(session.date, NaiveDate::from_ymd_opt(1970, 1, 1).unwrap());
        assert_eq!(session.type_of_session, SessionType::NotSpecified);
        assert_eq!(session.conference_key(), Some(&f.conference.key));

        let tasks = f.dispatcher.tasks_named(FEATURED_SPEAKER);
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].params["conf_key"], f.conference.key.urlsafe());
    }

    #[tokio::test]
    async fn create_is_owner_only() {
        let f = fixture();
        let err = f
            .service
            .create_session(
                Some(&Identity::new("eve", "eve@example.com")),
                &f.conference.key,
                SessionForm::named("Sneaky"),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ConferenceError::Forbidden(_)));
        assert!(f.dispatcher.tasks().is_empty());
    }

    #[tokio::test]
    async fn create_rejects_malformed_times() {
        let f = fixture();
        let err = f
            .service
            .create_session(Some(&org()), &f.conference.key, SessionForm::named("Late").start_time("7pm"))
            .await
            .unwrap_err();
        assert!(matches!(err, ConferenceError::BadRequest(_)));
    }

    #[tokio::test]
    async fn speakers_are_deduplicated_by_normalized_name() {
        let f = fixture();
        add(&f, SessionForm::named("One").speakers(["Grace Hopper"])).await;
        add(&f, SessionForm::named("Two").speakers(["  grace HOPPER ", "Alan Kay"])).await;

        let speakers = f.store.all::<Speaker>().unwrap();
        assert_eq!(speakers.len(), 2);
        let grace = f.store.load::<Speaker>(&Speaker::key_for("grace hopper")).unwrap().unwrap();
        assert_eq!(grace.name, "Grace Hopper");

        let by_grace = f.service.sessions_by_speaker("GRACE HOPPER").await.unwrap();
        assert_eq!(by_grace.len(), 2);

        let listed = f.service.conference_speakers(&f.conference.key).await.unwrap();
        let names: Vec<&str> = listed.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["Grace Hopper", "Alan Kay"]);
    }

    #[tokio::test]
    async fn listings_by_type_and_query_problem() {
        let f = fixture();
        add(&f, SessionForm::named("Morning workshop").type_of_session(SessionType::Workshop)).await;
        add(&f, SessionForm::named("Keynote").type_of_session(SessionType::Keynote).start_time("10:00")).await;
        add(&f, SessionForm::named("Evening talk").type_of_session(SessionType::Lecture).start_time("19:30")).await;

        let workshops = f
            .service
            .conference_sessions_by_type(&f.conference.key, SessionType::Workshop)
            .await
            .unwrap();
        assert_eq!(workshops.len(), 1);

        let problem: Vec<String> = f
            .service
            .query_problem()
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(problem, vec!["Keynote"]);

        assert_eq!(f.service.conference_sessions(&f.conference.key).await.unwrap().len(), 3);
        assert!(matches!(
            f.service.sessions_by_speaker("  ").await,
            Err(ConferenceError::BadRequest(_))
        ));
    }

    #[tokio::test]
    async fn featured_speaker_needs_more_than_one_session() {
        let f = fixture();
        add(&f, SessionForm::named("Solo").speakers(["Alan Kay"])).await;
        assert_eq!(f.service.recompute_featured_speaker(&f.conference.key).await.unwrap(), None);
        assert_eq!(f.service.featured_speaker(&f.conference.key), "");

        add(&f, SessionForm::named("COBOL").speakers(["Grace Hopper"])).await;
        add(&f, SessionForm::named("Compilers").speakers(["Grace Hopper", "Alan Kay"])).await;
        add(&f, SessionForm::named("Nanoseconds").speakers(["Grace Hopper"])).await;

        let text = f
            .service
            .recompute_featured_speaker(&f.conference.key)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(text, "Featured speaker: Grace Hopper. Sessions: COBOL, Compilers, Nanoseconds");
        assert_eq!(f.service.featured_speaker(&f.conference.key), text);
    }

    #[tokio::test]
    async fn featured_speaker_ties_go_to_the_first_name() {
        let f = fixture();
        add(&f, SessionForm::named("A").speakers(["Zed", "Amy"])).await;
        add(&f, SessionForm::named("B").speakers(["Zed", "Amy"])).await;

        let text = f
            .service
            .recompute_featured_speaker(&f.conference.key)
            .await
            .unwrap()
            .unwrap();
        assert!(text.starts_with("Featured speaker: Amy."), "{text}");
    }

    #[tokio::test]
    async fn unknown_conference_is_not_found() {
        let f = fixture();
        let missing = EntityKey::numeric("Conference", 9);
        assert!(matches!(
            f.service.conference_sessions(&missing).await,
            Err(ConferenceError::NotFound { .. })
        ));
    }
}
