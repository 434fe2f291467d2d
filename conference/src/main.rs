//! Conference Central demo.
//!
//! Wires every service against the in-memory entity store, starts the
//! background workers, and walks through a registration day.

use conference::filter::FilterDescriptor;
use conference::forms::{ConferenceForm, SessionForm};
use conference::tasks::{ChannelDispatcher, TaskWorker};
use conference::{Config, ConferenceApp, ConferenceError, Identity, SessionType};
use conference_core::environment::SystemClock;
use conference_runtime::MemoryCache;
use conference_runtime::metrics::MetricsServer;
use conference_testing::mocks::InMemoryEntityStore;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::from_env()?;

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_new(&config.log_filter)
                .unwrap_or_else(|_| "conference=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        max_retries = config.retry.max_retries,
        announcement_secs = config.announcement.refresh_secs,
        metrics = config.metrics.enabled,
        "Configuration loaded"
    );

    let mut metrics = MetricsServer::new(config.metrics_addr()?);
    if config.metrics.enabled {
        metrics.start()?;
    }

    // Services
    let store = Arc::new(InMemoryEntityStore::new());
    let cache = Arc::new(MemoryCache::new());
    let (dispatcher, queue) = ChannelDispatcher::new();
    let app = ConferenceApp::new(
        store.clone(),
        cache,
        Arc::new(dispatcher),
        Arc::new(SystemClock),
        &config,
    );

    // Background workers
    let (stop_worker, worker_stopped) = oneshot::channel();
    let worker = TaskWorker::new(app.sessions.clone()).spawn(queue, worker_stopped);
    let refresher = app
        .announcements
        .spawn_refresher(config.announcement_period());

    run_demo(&app).await?;

    refresher.abort();
    stop_worker.send(()).ok();
    let handled = worker.await?;
    info!(tasks = handled, entities = store.len(), "Demo finished");

    if let Some(text) = metrics.render() {
        println!("{text}");
    }
    Ok(())
}

async fn run_demo(app: &ConferenceApp) -> Result<(), ConferenceError> {
    let grace = Identity::new("grace", "grace@example.com").with_nickname("Grace");
    let ada = Identity::new("ada", "ada@example.com");
    let alan = Identity::new("alan", "alan@example.com");

    let rustconf = app
        .conferences
        .create_conference(
            Some(&grace),
            ConferenceForm::named("RustConf")
                .city("Paris")
                .topics(["Rust", "Systems"])
                .start_date("2026-09-14")
                .end_date("2026-09-16")
                .max_attendees(2),
        )
        .await?;
    app.conferences
        .create_conference(
            Some(&grace),
            ConferenceForm::named("GopherCon")
                .city("London")
                .topics(["Go"])
                .start_date("2026-06-01")
                .max_attendees(300),
        )
        .await?;

    for (title, kind, start, speakers) in [
        ("Ownership in practice", SessionType::Lecture, "10:00", vec!["Grace Hopper"]),
        ("Async deep dive", SessionType::Workshop, "14:00", vec!["grace hopper", "Alan Kay"]),
        ("Closing keynote", SessionType::Keynote, "19:30", vec!["Alan Kay"]),
    ] {
        app.sessions
            .create_session(
                Some(&grace),
                &rustconf.key,
                SessionForm::named(title)
                    .type_of_session(kind)
                    .start_time(start)
                    .date("2026-09-14")
                    .speakers(speakers),
            )
            .await?;
    }

    for attendee in [&ada, &alan, &grace] {
        match app.registrations.register(Some(attendee), &rustconf.key).await {
            Ok(outcome) => info!(user = %attendee.user_id, outcome = outcome.as_str(), "Registered"),
            Err(ConferenceError::Conflict(reason)) => {
                warn!(user = %attendee.user_id, %reason, "Registration refused");
            },
            Err(err) => return Err(err),
        }
    }

    info!(announcement = %app.announcements.recompute().await?, "Announcement");

    app.registrations.unregister(Some(&alan), &rustconf.key).await?;
    info!(announcement = %app.announcements.recompute().await?, "Announcement after a cancellation");

    let large = app
        .conferences
        .query_conferences(&[
            FilterDescriptor::new("TOPIC", "EQ", "Go"),
            FilterDescriptor::new("MAX_ATTENDEES", "GT", "100"),
        ])
        .await?;
    for conference in &large {
        info!(name = %conference.name, city = %conference.city, "Large Go conference");
    }

    let sessions = app.sessions.conference_sessions(&rustconf.key).await?;
    if let Some(first) = sessions.first() {
        app.wishlist.add_to_wishlist(Some(&ada), &first.key).await?;
    }
    let wishlist = app.wishlist.sessions_in_wishlist(Some(&ada)).await?;
    info!(sessions = wishlist.len(), "Ada's wishlist");

    let early = app.sessions.query_problem().await?;
    info!(sessions = early.len(), "Non-workshop sessions before 19:00");

    if let Some(featured) = app.sessions.recompute_featured_speaker(&rustconf.key).await? {
        info!(%featured, "Featured speaker");
    }

    Ok(())
}
