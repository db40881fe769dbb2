/// PostgreSQL event store tests
///
/// Need a reachable database:
///   DATABASE_URL=postgres://... cargo test --test pg_event_store -- --ignored
///
/// Every test uses its own event type so runs don't see each other's rows.
use std::sync::Arc;

use conservator::PooledConnection;
use serde_json::json;
use uuid::Uuid;

use eventhub::event_bus::{Event, EventFilter, EventStore, PgEventStore, StoreError};

async fn connect_store() -> PgEventStore {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL not set");
    let pool = Arc::new(PooledConnection::from_url(&url).expect("invalid DATABASE_URL"));
    let store = PgEventStore::new(pool);
    store.ensure_schema().await.expect("schema setup failed");
    store
}

fn unique_type(action: &str) -> String {
    format!("test-{}.{}", Uuid::new_v4().simple(), action)
}

#[tokio::test]
#[ignore] // Run manually: cargo test --test pg_event_store -- --ignored
async fn test_saved_event_reads_back_equal() {
    let store = connect_store().await;
    let event_type = unique_type("created");

    let event = Event::new(event_type.clone(), json!({"nested": {"n": 1}}))
        .with_user("user-1")
        .with_correlation("corr-1");
    store.save_event(&event).await.unwrap();

    let found = store
        .get_events(&EventFilter::default().event_type(event_type).limit(1))
        .await
        .unwrap();
    assert_eq!(found, vec![event]);
}

#[tokio::test]
#[ignore]
async fn test_duplicate_id_rolled_back_and_pool_reusable() {
    let store = connect_store().await;
    let event_type = unique_type("created");

    let event = Event::new(event_type.clone(), json!({"v": 1}));
    store.save_event(&event).await.unwrap();

    let mut clash = event.clone();
    clash.data = json!({"v": 2});
    assert!(matches!(
        store.save_event(&clash).await,
        Err(StoreError::Duplicate(id)) if id == event.id
    ));

    // The failed save must not leave an open transaction behind
    let next = Event::new(event_type.clone(), json!({"v": 3}));
    store.save_event(&next).await.unwrap();

    let found = store
        .get_events(&EventFilter::default().event_type(event_type))
        .await
        .unwrap();
    assert_eq!(found.len(), 2);
    assert!(found.iter().all(|e| e.data != json!({"v": 2})));
}

#[tokio::test]
#[ignore]
async fn test_filters_are_conjunctive_and_newest_first() {
    let store = connect_store().await;
    let event_type = unique_type("updated");
    let other_type = unique_type("deleted");

    let mut saved = Vec::new();
    for n in 0..3 {
        let event = Event::new(event_type.clone(), json!({"n": n})).with_user("alice");
        store.save_event(&event).await.unwrap();
        saved.push(event);
    }
    store
        .save_event(&Event::new(event_type.clone(), json!({})).with_user("bob"))
        .await
        .unwrap();
    store
        .save_event(&Event::new(other_type, json!({})).with_user("alice"))
        .await
        .unwrap();

    let found = store
        .get_events(
            &EventFilter::default()
                .event_type(event_type.clone())
                .user_id("alice"),
        )
        .await
        .unwrap();
    assert_eq!(found.len(), 3);
    assert!(
        found
            .windows(2)
            .all(|pair| pair[0].timestamp >= pair[1].timestamp)
    );
    assert_eq!(found[0], saved[2]);

    let none = store
        .get_events(&EventFilter::default().event_type(event_type).limit(0))
        .await
        .unwrap();
    assert!(none.is_empty());
}
