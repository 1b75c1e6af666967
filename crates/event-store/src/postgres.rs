use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::{
    AggregateId, BufferedEvent, EventBufferStore, EventEnvelope, EventId, EventStoreError,
    ParkedEvent, Result, Version,
    store::{EventStore, validate_events_for_append},
};

/// Runs the workspace migrations (event log and event buffer tables).
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("../../migrations").run(pool).await?;
    Ok(())
}

fn parse_stream(aggregate_type: &str, stream: &str) -> Result<AggregateId> {
    AggregateId::parse(aggregate_type, stream)
        .map_err(|e| EventStoreError::CorruptRow(e.to_string()))
}

fn parse_metadata(row: &PgRow) -> Result<HashMap<String, serde_json::Value>> {
    let metadata_json: serde_json::Value = row.try_get("metadata")?;
    Ok(serde_json::from_value(metadata_json)?)
}

/// PostgreSQL-backed event log.
///
/// Streams live in a single `events` table keyed by stream name. The
/// `unique_aggregate_version` constraint is the final arbiter when two
/// writers race past the version check.
#[derive(Clone)]
pub struct PostgresEventStore {
    pool: PgPool,
}

impl PostgresEventStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn run_migrations(&self) -> Result<()> {
        run_migrations(&self.pool).await
    }

    fn row_to_event(row: PgRow) -> Result<EventEnvelope> {
        let aggregate_type: String = row.try_get("aggregate_type")?;
        let stream: String = row.try_get("aggregate_id")?;

        Ok(EventEnvelope {
            event_id: EventId::from_uuid(row.try_get::<Uuid, _>("id")?),
            event_type: row.try_get("event_type")?,
            aggregate_id: parse_stream(&aggregate_type, &stream)?,
            aggregate_type,
            version: Version::new(row.try_get("version")?),
            timestamp: row.try_get("timestamp")?,
            data: row.try_get("data")?,
            metadata: parse_metadata(&row)?,
        })
    }

    async fn current_version(&self, aggregate_id: &AggregateId) -> Result<Version> {
        Ok(self
            .stream_version(aggregate_id)
            .await?
            .unwrap_or(Version::initial()))
    }
}

#[async_trait]
impl EventStore for PostgresEventStore {
    async fn read_stream(&self, aggregate_id: &AggregateId) -> Result<Vec<EventEnvelope>> {
        let rows = sqlx::query(
            r#"
            SELECT id, event_type, aggregate_id, aggregate_type, version, timestamp, data, metadata
            FROM events
            WHERE aggregate_id = $1
            ORDER BY version ASC
            "#,
        )
        .bind(aggregate_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_event).collect()
    }

    #[tracing::instrument(skip(self, events), fields(stream = %aggregate_id, count = events.len()))]
    async fn append_to_stream(
        &self,
        aggregate_id: &AggregateId,
        expected_version: Version,
        events: Vec<EventEnvelope>,
    ) -> Result<Version> {
        validate_events_for_append(aggregate_id, expected_version, &events)?;
        let stream = aggregate_id.to_string();

        let mut tx = self.pool.begin().await?;

        let current: Option<i64> =
            sqlx::query_scalar("SELECT MAX(version) FROM events WHERE aggregate_id = $1")
                .bind(&stream)
                .fetch_one(&mut *tx)
                .await?;
        let actual = Version::new(current.unwrap_or(0));

        if actual != expected_version {
            return Err(EventStoreError::ConcurrencyConflict {
                aggregate_id: aggregate_id.clone(),
                expected: expected_version,
                actual,
            });
        }

        let mut last_version = expected_version;
        for event in &events {
            let metadata_json = serde_json::to_value(&event.metadata)?;

            let inserted = sqlx::query(
                r#"
                INSERT INTO events (id, event_type, aggregate_id, aggregate_type, version, timestamp, data, metadata)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                "#,
            )
            .bind(event.event_id.as_uuid())
            .bind(&event.event_type)
            .bind(&stream)
            .bind(&event.aggregate_type)
            .bind(event.version.as_i64())
            .bind(event.timestamp)
            .bind(&event.data)
            .bind(metadata_json)
            .execute(&mut *tx)
            .await;

            if let Err(e) = inserted {
                if let sqlx::Error::Database(ref db_err) = e
                    && db_err.constraint() == Some("unique_aggregate_version")
                {
                    drop(tx);
                    let actual = self.current_version(aggregate_id).await?;
                    tracing::debug!(%actual, "lost append race");
                    return Err(EventStoreError::ConcurrencyConflict {
                        aggregate_id: aggregate_id.clone(),
                        expected: expected_version,
                        actual,
                    });
                }
                return Err(EventStoreError::Database(e));
            }

            last_version = event.version;
        }

        tx.commit().await?;

        metrics::counter!("event_store_events_appended_total").increment(events.len() as u64);
        Ok(last_version)
    }

    async fn stream_version(&self, aggregate_id: &AggregateId) -> Result<Option<Version>> {
        let version: Option<i64> =
            sqlx::query_scalar("SELECT MAX(version) FROM events WHERE aggregate_id = $1")
                .bind(aggregate_id.to_string())
                .fetch_one(&self.pool)
                .await?;

        Ok(version.map(Version::new))
    }
}

/// PostgreSQL-backed event buffer.
#[derive(Clone)]
pub struct PostgresEventBuffer {
    pool: PgPool,
}

impl PostgresEventBuffer {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn row_to_buffered(row: &PgRow) -> Result<BufferedEvent> {
        let aggregate_type: String = row.try_get("aggregate_type")?;
        let stream: String = row.try_get("aggregate_id")?;

        Ok(BufferedEvent {
            event_id: EventId::from_uuid(row.try_get::<Uuid, _>("event_id")?),
            event_type: row.try_get("event_type")?,
            aggregate_id: parse_stream(&aggregate_type, &stream)?,
            aggregate_type,
            version: Version::new(row.try_get("version")?),
            data: row.try_get("data")?,
            metadata: parse_metadata(row)?,
            timestamp: row.try_get("timestamp")?,
            expiry_timestamp: row.try_get("expiry_timestamp")?,
        })
    }
}

#[async_trait]
impl EventBufferStore for PostgresEventBuffer {
    async fn upsert(&self, event: BufferedEvent) -> Result<()> {
        let metadata_json = serde_json::to_value(&event.metadata)?;

        sqlx::query(
            r#"
            INSERT INTO event_buffer
                (event_id, event_type, aggregate_type, aggregate_id, version, data, metadata, timestamp, expiry_timestamp)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (event_id) DO UPDATE SET
                event_type = EXCLUDED.event_type,
                aggregate_type = EXCLUDED.aggregate_type,
                aggregate_id = EXCLUDED.aggregate_id,
                version = EXCLUDED.version,
                data = EXCLUDED.data,
                metadata = EXCLUDED.metadata,
                timestamp = EXCLUDED.timestamp,
                expiry_timestamp = EXCLUDED.expiry_timestamp
            "#,
        )
        .bind(event.event_id.as_uuid())
        .bind(&event.event_type)
        .bind(&event.aggregate_type)
        .bind(event.aggregate_id.to_string())
        .bind(event.version.as_i64())
        .bind(&event.data)
        .bind(metadata_json)
        .bind(event.timestamp)
        .bind(event.expiry_timestamp)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_expired(&self, now: DateTime<Utc>) -> Result<Vec<BufferedEvent>> {
        let rows = sqlx::query(
            r#"
            SELECT event_id, event_type, aggregate_type, aggregate_id, version, data, metadata, timestamp, expiry_timestamp
            FROM event_buffer
            WHERE expiry_timestamp <= $1
            ORDER BY expiry_timestamp ASC, timestamp ASC
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_buffered).collect()
    }

    async fn delete(&self, event_id: EventId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM event_buffer WHERE event_id = $1")
            .bind(event_id.as_uuid())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn park(&self, event_id: EventId, reason: &str) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(
            r#"
            DELETE FROM event_buffer
            WHERE event_id = $1
            RETURNING event_id, event_type, aggregate_type, aggregate_id, version, data, metadata, timestamp, expiry_timestamp
            "#,
        )
        .bind(event_id.as_uuid())
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(EventStoreError::BufferedEventNotFound(event_id))?;

        let event = Self::row_to_buffered(&row)?;
        let metadata_json = serde_json::to_value(&event.metadata)?;

        sqlx::query(
            r#"
            INSERT INTO event_buffer_parked
                (event_id, event_type, aggregate_type, aggregate_id, version, data, metadata, timestamp, expiry_timestamp, reason, parked_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(event.event_id.as_uuid())
        .bind(&event.event_type)
        .bind(&event.aggregate_type)
        .bind(event.aggregate_id.to_string())
        .bind(event.version.as_i64())
        .bind(&event.data)
        .bind(metadata_json)
        .bind(event.timestamp)
        .bind(event.expiry_timestamp)
        .bind(reason)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn parked(&self) -> Result<Vec<ParkedEvent>> {
        let rows = sqlx::query(
            r#"
            SELECT event_id, event_type, aggregate_type, aggregate_id, version, data, metadata, timestamp, expiry_timestamp, reason, parked_at
            FROM event_buffer_parked
            ORDER BY parked_at ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(ParkedEvent {
                    event: Self::row_to_buffered(row)?,
                    reason: row.try_get("reason")?,
                    parked_at: row.try_get("parked_at")?,
                })
            })
            .collect()
    }
}
