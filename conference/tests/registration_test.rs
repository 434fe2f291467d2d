//! Seat reservation under concurrency and arbitrary operation sequences.

use conference::registration::{RegistrationManager, RegistrationOutcome};
use conference::{Conference, ConferenceError, ConflictReason, Identity, Profile};
use conference_core::key::EntityKey;
use conference_runtime::retry::RetryPolicy;
use conference_testing::mocks::InMemoryEntityStore;
use proptest::prelude::*;
use std::sync::Arc;
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};

fn conference(max: i64, seats: i64) -> Conference {
    Conference {
        key: EntityKey::numeric("Conference", 1).with_parent(EntityKey::named("Profile", "org")),
        name: "RustConf".into(),
        description: None,
        organizer_user_id: "org".into(),
        topics: vec!["Rust".into()],
        city: "Paris".into(),
        start_date: None,
        end_date: None,
        month: 0,
        max_attendees: max,
        seats_available: seats,
    }
}

fn user(n: usize) -> Identity {
    Identity::new(format!("user{n}"), format!("user{n}@example.com"))
}

fn patient_policy() -> RetryPolicy {
    RetryPolicy::builder()
        .max_retries(50)
        .initial_delay(Duration::from_millis(1))
        .max_delay(Duration::from_millis(5))
        .build()
}

fn attendees(store: &InMemoryEntityStore, key: &EntityKey) -> usize {
    store
        .all::<Profile>()
        .unwrap()
        .iter()
        .filter(|profile| profile.is_attending(key))
        .count()
}

#[tokio::test]
async fn last_seat_scenario() {
    let store = Arc::new(InMemoryEntityStore::new());
    let conf = conference(10, 1);
    store.seed(&conf).unwrap();
    let manager = RegistrationManager::new(store.clone(), RetryPolicy::default());
    let (a, b) = (user(1), user(2));

    let outcome = assert_ok!(manager.register(Some(&a), &conf.key).await);
    assert_eq!(outcome, RegistrationOutcome::Registered);
    assert_eq!(store.load::<Conference>(&conf.key).unwrap().unwrap().seats_available, 0);

    let err = assert_err!(manager.register(Some(&b), &conf.key).await);
    assert_eq!(err.conflict_reason(), Some(ConflictReason::NoSeatsAvailable));

    let outcome = assert_ok!(manager.unregister(Some(&a), &conf.key).await);
    assert_eq!(outcome, RegistrationOutcome::Unregistered);
    assert_eq!(store.load::<Conference>(&conf.key).unwrap().unwrap().seats_available, 1);
    assert_eq!(attendees(&store, &conf.key), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_registrations_for_one_seat_admit_exactly_one() {
    let store = Arc::new(InMemoryEntityStore::with_latency(Duration::from_millis(1)));
    let conf = conference(5, 1);
    store.seed(&conf).unwrap();
    let manager = RegistrationManager::new(store.clone(), patient_policy());

    let handles: Vec<_> = (0..12)
        .map(|n| {
            let manager = manager.clone();
            let key = conf.key.clone();
            tokio::spawn(async move { manager.register(Some(&user(n)), &key).await })
        })
        .collect();

    let mut admitted = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(RegistrationOutcome::Registered) => admitted += 1,
            Ok(other) => panic!("unexpected outcome {other:?}"),
            Err(ConferenceError::Conflict(ConflictReason::NoSeatsAvailable))
            | Err(ConferenceError::TransientStoreContention { .. }) => {},
            Err(err) => panic!("unexpected error {err}"),
        }
    }

    let stored = store.load::<Conference>(&conf.key).unwrap().unwrap();
    assert_eq!(admitted, 1);
    assert_eq!(stored.seats_available, 0);
    assert_eq!(attendees(&store, &conf.key), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_register_and_unregister_keep_the_count() {
    let store = Arc::new(InMemoryEntityStore::with_latency(Duration::from_millis(1)));
    let conf = conference(20, 20);
    store.seed(&conf).unwrap();
    let manager = RegistrationManager::new(store.clone(), patient_policy());

    for n in 0..10 {
        manager.register(Some(&user(n)), &conf.key).await.unwrap();
    }

    let handles: Vec<_> = (0..10)
        .map(|n| {
            let manager = manager.clone();
            let key = conf.key.clone();
            tokio::spawn(async move {
                if n % 2 == 0 {
                    manager.unregister(Some(&user(n)), &key).await
                } else {
                    manager.register(Some(&user(n + 100)), &key).await
                }
            })
        })
        .collect();
    for handle in handles {
        let _ = handle.await.unwrap();
    }

    let stored = store.load::<Conference>(&conf.key).unwrap().unwrap();
    let count = attendees(&store, &conf.key);
    assert_eq!(usize::try_from(stored.attendee_count()).unwrap(), count);
    assert!(stored.seats_available >= 0 && stored.seats_available <= stored.max_attendees);
}

#[derive(Clone, Copy, Debug)]
enum Op {
    Register(usize),
    Unregister(usize),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0..4_usize).prop_map(Op::Register),
        (0..4_usize).prop_map(Op::Unregister),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn seat_count_tracks_attendees(capacity in 0..4_i64, ops in prop::collection::vec(op(), 1..24)) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        runtime.block_on(async {
            let store = Arc::new(InMemoryEntityStore::new());
            let conf = conference(capacity, capacity);
            store.seed(&conf).unwrap();
            let manager = RegistrationManager::new(store.clone(), RetryPolicy::default());

            for op in ops {
                let before = store.load::<Conference>(&conf.key).unwrap().unwrap().seats_available;
                let result = match op {
                    Op::Register(n) => manager.register(Some(&user(n)), &conf.key).await,
                    Op::Unregister(n) => manager.unregister(Some(&user(n)), &conf.key).await,
                };
                let after = store.load::<Conference>(&conf.key).unwrap().unwrap();

                match result {
                    Ok(RegistrationOutcome::Registered) => prop_assert_eq!(after.seats_available, before - 1),
                    Ok(RegistrationOutcome::Unregistered) => prop_assert_eq!(after.seats_available, before + 1),
                    Ok(RegistrationOutcome::NotRegistered) | Err(ConferenceError::Conflict(_)) => {
                        prop_assert_eq!(after.seats_available, before);
                    },
                    Err(err) => prop_assert!(false, "unexpected error {}", err),
                }

                prop_assert!(after.seats_available >= 0);
                prop_assert!(after.seats_available <= after.max_attendees);
                prop_assert_eq!(
                    usize::try_from(after.attendee_count()).unwrap(),
                    attendees(&store, &conf.key)
                );
            }
            Ok(())
        })?;
    }
}
