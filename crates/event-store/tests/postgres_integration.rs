//! PostgreSQL integration tests
//!
//! These tests share one PostgreSQL container and truncate tables between
//! runs, so they are serialised with `#[serial]`. Run with:
//!
//! ```bash
//! cargo test -p event-store --test postgres_integration
//! ```

use std::sync::Arc;

use chrono::{Duration, Utc};
use event_store::{
    AggregateId, AggregateKey, BufferedEvent, EventBufferStore, EventEnvelope, EventStore,
    EventStoreError, EventStoreExt, PostgresEventBuffer, PostgresEventStore, Version,
};
use serial_test::serial;
use sqlx::PgPool;
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

/// Shared container info - container stays alive for all tests
struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let temp_pool = PgPool::connect(&connection_string).await.unwrap();
            event_store::run_migrations(&temp_pool).await.unwrap();
            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

/// Fresh pool with cleared tables
async fn get_test_pool() -> PgPool {
    let info = get_container_info().await;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(10)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query("TRUNCATE TABLE events, event_buffer, event_buffer_parked")
        .execute(&pool)
        .await
        .unwrap();

    pool
}

fn location_id(object_id: &str) -> AggregateId {
    AggregateId::new("location", AggregateKey::new("tenant1", object_id))
}

fn create_test_event(aggregate_id: &AggregateId, version: i64, event_type: &str) -> EventEnvelope {
    EventEnvelope::builder()
        .aggregate_id(aggregate_id.clone())
        .event_type(event_type)
        .version(Version::new(version))
        .data_raw(serde_json::json!({"rawAddress": "1 Main St"}))
        .metadata("tenant", serde_json::json!("tenant1"))
        .build()
        .unwrap()
}

#[tokio::test]
#[serial]
async fn append_and_read_stream() {
    let store = PostgresEventStore::new(get_test_pool().await);
    let id = location_id("loc-1");

    let version = store
        .append_to_stream(
            &id,
            Version::initial(),
            vec![create_test_event(&id, 1, "V1_LOCATION_CREATE")],
        )
        .await
        .unwrap();
    assert_eq!(version, Version::first());

    let events = store.read_stream(&id).await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, "V1_LOCATION_CREATE");
    assert_eq!(events[0].aggregate_id, id);
    assert_eq!(events[0].aggregate_type, "location");
    assert_eq!(events[0].metadata_str("tenant"), Some("tenant1"));
}

#[tokio::test]
#[serial]
async fn append_batch_and_stream_version() {
    let store = PostgresEventStore::new(get_test_pool().await);
    let id = location_id("loc-2");

    assert!(!store.stream_exists(&id).await.unwrap());

    let events = vec![
        create_test_event(&id, 1, "V1_LOCATION_CREATE"),
        create_test_event(&id, 2, "V1_LOCATION_SKIPPED_VALIDATION"),
    ];
    store
        .append_to_stream(&id, Version::initial(), events)
        .await
        .unwrap();

    assert!(store.stream_exists(&id).await.unwrap());
    assert_eq!(store.stream_version(&id).await.unwrap(), Some(Version::new(2)));

    let read: Vec<_> = store
        .read_stream(&id)
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.version.as_i64())
        .collect();
    assert_eq!(read, vec![1, 2]);
}

#[tokio::test]
#[serial]
async fn stale_expected_version_conflicts() {
    let store = PostgresEventStore::new(get_test_pool().await);
    let id = location_id("loc-3");

    store
        .append_to_stream(
            &id,
            Version::initial(),
            vec![create_test_event(&id, 1, "V1_LOCATION_CREATE")],
        )
        .await
        .unwrap();

    let result = store
        .append_to_stream(
            &id,
            Version::initial(),
            vec![create_test_event(&id, 1, "V1_LOCATION_CREATE")],
        )
        .await;

    match result {
        Err(EventStoreError::ConcurrencyConflict {
            expected, actual, ..
        }) => {
            assert_eq!(expected, Version::initial());
            assert_eq!(actual, Version::first());
        }
        other => panic!("expected concurrency conflict, got {other:?}"),
    }
}

#[tokio::test]
#[serial]
async fn concurrent_appends_at_same_version_have_one_winner() {
    let store = PostgresEventStore::new(get_test_pool().await);
    let id = location_id("loc-4");

    store
        .append_to_stream(
            &id,
            Version::initial(),
            vec![create_test_event(&id, 1, "V1_LOCATION_CREATE")],
        )
        .await
        .unwrap();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let store = store.clone();
            let id = id.clone();
            tokio::spawn(async move {
                store
                    .append_to_stream(
                        &id,
                        Version::first(),
                        vec![create_test_event(&id, 2, "V1_LOCATION_UPDATE")],
                    )
                    .await
            })
        })
        .collect();

    let results = futures_util::future::join_all(handles).await;
    let mut successes = 0;
    for result in results {
        match result.unwrap() {
            Ok(_) => successes += 1,
            Err(e) => assert!(e.is_concurrency_conflict(), "unexpected error: {e}"),
        }
    }

    assert_eq!(successes, 1);
    assert_eq!(store.read_stream(&id).await.unwrap().len(), 2);
}

#[tokio::test]
#[serial]
async fn streams_of_different_tenants_are_separate() {
    let store = PostgresEventStore::new(get_test_pool().await);
    let a = AggregateId::new("location", AggregateKey::new("tenantA", "same"));
    let b = AggregateId::new("location", AggregateKey::new("tenantB", "same"));

    store
        .append_to_stream(
            &a,
            Version::initial(),
            vec![create_test_event(&a, 1, "V1_LOCATION_CREATE")],
        )
        .await
        .unwrap();

    assert!(store.read_stream(&b).await.unwrap().is_empty());
    assert_eq!(store.stream_version(&b).await.unwrap(), None);
}

#[tokio::test]
#[serial]
async fn buffer_round_trip_and_delete() {
    let buffer = PostgresEventBuffer::new(get_test_pool().await);
    let id = AggregateId::new("contact", AggregateKey::new("tenant1", "c-1"));
    let now = Utc::now();

    let due = BufferedEvent::schedule(
        create_test_event(&id, 3, "V1_CONTACT_EMAIL_SET_NON_PRIMARY"),
        now - Duration::minutes(1),
    );
    let not_due = BufferedEvent::schedule(
        create_test_event(&id, 3, "V1_CONTACT_EMAIL_SET_NON_PRIMARY"),
        now + Duration::hours(1),
    );
    buffer.upsert(due.clone()).await.unwrap();
    buffer.upsert(not_due).await.unwrap();

    let expired = buffer.get_expired(now).await.unwrap();
    assert_eq!(expired.len(), 1);
    assert_eq!(expired[0].event_id, due.event_id);
    assert_eq!(expired[0].aggregate_id, id);
    assert_eq!(expired[0].to_envelope().metadata_str("tenant"), Some("tenant1"));

    assert!(buffer.delete(due.event_id).await.unwrap());
    assert!(!buffer.delete(due.event_id).await.unwrap());
    assert!(buffer.get_expired(now).await.unwrap().is_empty());
}

#[tokio::test]
#[serial]
async fn buffer_park_moves_row() {
    let buffer = PostgresEventBuffer::new(get_test_pool().await);
    let id = AggregateId::new("contact", AggregateKey::new("tenant1", "c-2"));
    let now = Utc::now();

    let row = BufferedEvent::schedule(
        create_test_event(&id, 1, "V1_CONTACT_EMAIL_SET_NON_PRIMARY"),
        now - Duration::seconds(5),
    );
    buffer.upsert(row.clone()).await.unwrap();

    buffer.park(row.event_id, "handler failed").await.unwrap();

    assert!(buffer.get_expired(now).await.unwrap().is_empty());
    let parked = buffer.parked().await.unwrap();
    assert_eq!(parked.len(), 1);
    assert_eq!(parked[0].event.event_id, row.event_id);
    assert_eq!(parked[0].reason, "handler failed");

    let missing = buffer.park(row.event_id, "again").await;
    assert!(matches!(
        missing,
        Err(EventStoreError::BufferedEventNotFound(_))
    ));
}
