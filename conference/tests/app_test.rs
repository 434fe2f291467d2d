//! End-to-end flows through `ConferenceApp`.

use conference::announcement::ANNOUNCEMENT_PREFIX;
use conference::filter::FilterDescriptor;
use conference::forms::{ConferenceForm, SessionForm};
use conference::tasks::{ChannelDispatcher, SEND_CONFIRMATION_EMAIL, TaskWorker};
use conference::{Config, ConferenceApp, ConferenceError, Identity, SessionType};
use conference_runtime::MemoryCache;
use conference_testing::mocks::{InMemoryEntityStore, RecordingDispatcher, test_clock};
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio_test::{assert_err, assert_ok};

fn organizer() -> Identity {
    Identity::new("grace", "grace@example.com")
}

fn app_with(dispatcher: Arc<RecordingDispatcher>) -> ConferenceApp {
    ConferenceApp::new(
        Arc::new(InMemoryEntityStore::new()),
        Arc::new(MemoryCache::new()),
        dispatcher,
        Arc::new(test_clock()),
        &Config::default(),
    )
}

async fn create(app: &ConferenceApp, name: &str, city: &str, max: i64) {
    assert_ok!(
        app.conferences
            .create_conference(Some(&organizer()), ConferenceForm::named(name).city(city).max_attendees(max))
            .await
    );
}

#[tokio::test]
async fn city_and_capacity_filters() {
    let app = app_with(Arc::new(RecordingDispatcher::new()));
    create(&app, "Big Paris", "Paris", 100).await;
    create(&app, "Small Paris", "Paris", 20).await;
    create(&app, "Huge Paris", "Paris", 500).await;
    create(&app, "London", "London", 200).await;

    let found = assert_ok!(
        app.conferences
            .query_conferences(&[
                FilterDescriptor::new("CITY", "EQ", "Paris"),
                FilterDescriptor::new("MAX_ATTENDEES", "GT", "50"),
            ])
            .await
    );
    let names: Vec<&str> = found.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["Big Paris", "Huge Paris"]);

    let err = assert_err!(
        app.conferences
            .query_conferences(&[
                FilterDescriptor::new("CITY", "NE", "Paris"),
                FilterDescriptor::new("MAX_ATTENDEES", "GT", "50"),
            ])
            .await
    );
    assert!(matches!(err, ConferenceError::UnsupportedFilterCombination { .. }));
}

#[tokio::test]
async fn announcement_names_only_nearly_full_conferences() {
    let app = app_with(Arc::new(RecordingDispatcher::new()));
    create(&app, "Three left", "Paris", 3).await;
    create(&app, "Sold out", "Paris", 0).await;
    create(&app, "Six left", "Paris", 6).await;

    let text = assert_ok!(app.announcements.recompute().await);
    assert_eq!(text, format!("{ANNOUNCEMENT_PREFIX}Three left"));
    assert_eq!(app.announcements.read(), text);
}

#[tokio::test]
async fn creating_a_conference_enqueues_a_confirmation() {
    let dispatcher = Arc::new(RecordingDispatcher::new());
    let app = app_with(dispatcher.clone());
    create(&app, "RustConf", "Paris", 10).await;

    let sent = dispatcher.tasks_named(SEND_CONFIRMATION_EMAIL);
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].params["email"], "grace@example.com");
}

#[tokio::test]
async fn registering_shows_up_in_conferences_to_attend() {
    let app = app_with(Arc::new(RecordingDispatcher::new()));
    let conference = assert_ok!(
        app.conferences
            .create_conference(Some(&organizer()), ConferenceForm::named("RustConf").max_attendees(2))
            .await
    );
    let ada = Identity::new("ada", "ada@example.com");

    assert_ok!(app.registrations.register(Some(&ada), &conference.key).await);
    let attending = assert_ok!(app.conferences.conferences_to_attend(Some(&ada)).await);
    assert_eq!(attending.len(), 1);
    assert_eq!(attending[0].seats_available, 1);
}

#[tokio::test]
async fn worker_refreshes_the_featured_speaker() {
    let (dispatcher, queue) = ChannelDispatcher::new();
    let app = ConferenceApp::new(
        Arc::new(InMemoryEntityStore::new()),
        Arc::new(MemoryCache::new()),
        Arc::new(dispatcher),
        Arc::new(test_clock()),
        &Config::default(),
    );
    let (stop, stopped) = oneshot::channel();
    let worker = TaskWorker::new(app.sessions.clone()).spawn(queue, stopped);

    let conference = assert_ok!(
        app.conferences
            .create_conference(Some(&organizer()), ConferenceForm::named("RustConf"))
            .await
    );
    for (title, kind) in [("Ownership", SessionType::Lecture), ("Lifetimes", SessionType::Workshop)] {
        assert_ok!(
            app.sessions
                .create_session(
                    Some(&organizer()),
                    &conference.key,
                    SessionForm::named(title).type_of_session(kind).speakers(["Ada Lovelace"]),
                )
                .await
        );
    }

    stop.send(()).ok();
    // One confirmation email and two featured speaker tasks.
    assert_eq!(worker.await.unwrap(), 3);

    assert_eq!(
        app.sessions.featured_speaker(&conference.key),
        "Featured speaker: Ada Lovelace. Sessions: Ownership, Lifetimes"
    );
}
