//! Durable holding area for events whose application is deferred.
//!
//! A collaborator that needs a future state change (a reminder, a delayed
//! notification) writes a [`BufferedEvent`] with an expiry timestamp. A
//! watcher later picks up expired rows, applies them to their aggregate and
//! deletes them. Rows are read possibly many times and deleted once.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::{AggregateId, EventEnvelope, EventId, EventStoreError, Result, Version};

/// A row of the event buffer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BufferedEvent {
    pub event_id: EventId,
    pub event_type: String,
    pub aggregate_type: String,
    pub aggregate_id: AggregateId,

    /// Version the writer observed when scheduling. Informational only: the
    /// event is appended at whatever version the stream has at delivery time.
    pub version: Version,

    pub data: serde_json::Value,
    pub metadata: HashMap<String, serde_json::Value>,
    pub timestamp: DateTime<Utc>,

    /// The row becomes eligible for delivery at this instant.
    pub expiry_timestamp: DateTime<Utc>,
}

impl BufferedEvent {
    /// Schedules an event for delivery at `expiry_timestamp`.
    pub fn schedule(event: EventEnvelope, expiry_timestamp: DateTime<Utc>) -> Self {
        Self {
            event_id: event.event_id,
            event_type: event.event_type,
            aggregate_type: event.aggregate_type,
            aggregate_id: event.aggregate_id,
            version: event.version,
            data: event.data,
            metadata: event.metadata,
            timestamp: event.timestamp,
            expiry_timestamp,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expiry_timestamp <= now
    }

    /// Reconstructs the event carried by this row.
    pub fn to_envelope(&self) -> EventEnvelope {
        EventEnvelope {
            event_id: self.event_id,
            event_type: self.event_type.clone(),
            aggregate_type: self.aggregate_type.clone(),
            aggregate_id: self.aggregate_id.clone(),
            version: self.version,
            timestamp: self.timestamp,
            data: self.data.clone(),
            metadata: self.metadata.clone(),
        }
    }
}

/// A row that was taken out of delivery after failing repeatedly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParkedEvent {
    pub event: BufferedEvent,
    pub reason: String,
    pub parked_at: DateTime<Utc>,
}

/// Storage backend for the event buffer.
#[async_trait]
pub trait EventBufferStore: Send + Sync {
    /// Inserts a row, or replaces the row with the same event id.
    async fn upsert(&self, event: BufferedEvent) -> Result<()>;

    /// Returns every row with `expiry_timestamp <= now`, oldest expiry first.
    async fn get_expired(&self, now: DateTime<Utc>) -> Result<Vec<BufferedEvent>>;

    /// Deletes a row. Returns false if it was already gone, which happens
    /// when another watcher delivered it first.
    async fn delete(&self, event_id: EventId) -> Result<bool>;

    /// Moves a row to the dead-letter area so it is no longer delivered.
    async fn park(&self, event_id: EventId, reason: &str) -> Result<()>;

    /// Lists dead-lettered rows.
    async fn parked(&self) -> Result<Vec<ParkedEvent>>;
}

#[async_trait]
impl<T: EventBufferStore + ?Sized> EventBufferStore for Arc<T> {
    async fn upsert(&self, event: BufferedEvent) -> Result<()> {
        (**self).upsert(event).await
    }

    async fn get_expired(&self, now: DateTime<Utc>) -> Result<Vec<BufferedEvent>> {
        (**self).get_expired(now).await
    }

    async fn delete(&self, event_id: EventId) -> Result<bool> {
        (**self).delete(event_id).await
    }

    async fn park(&self, event_id: EventId, reason: &str) -> Result<()> {
        (**self).park(event_id, reason).await
    }

    async fn parked(&self) -> Result<Vec<ParkedEvent>> {
        (**self).parked().await
    }
}

#[derive(Default)]
struct BufferTables {
    rows: BTreeMap<EventId, BufferedEvent>,
    parked: Vec<ParkedEvent>,
}

/// In-memory event buffer for tests and single-process deployments.
#[derive(Clone, Default)]
pub struct InMemoryEventBuffer {
    tables: Arc<RwLock<BufferTables>>,
}

impl InMemoryEventBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of rows awaiting delivery.
    pub async fn len(&self) -> usize {
        self.tables.read().await.rows.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn get(&self, event_id: EventId) -> Option<BufferedEvent> {
        self.tables.read().await.rows.get(&event_id).cloned()
    }
}

#[async_trait]
impl EventBufferStore for InMemoryEventBuffer {
    async fn upsert(&self, event: BufferedEvent) -> Result<()> {
        self.tables.write().await.rows.insert(event.event_id, event);
        Ok(())
    }

    async fn get_expired(&self, now: DateTime<Utc>) -> Result<Vec<BufferedEvent>> {
        let tables = self.tables.read().await;
        let mut expired: Vec<_> = tables
            .rows
            .values()
            .filter(|row| row.is_expired(now))
            .cloned()
            .collect();
        expired.sort_by(|a, b| {
            a.expiry_timestamp
                .cmp(&b.expiry_timestamp)
                .then(a.timestamp.cmp(&b.timestamp))
        });
        Ok(expired)
    }

    async fn delete(&self, event_id: EventId) -> Result<bool> {
        Ok(self.tables.write().await.rows.remove(&event_id).is_some())
    }

    async fn park(&self, event_id: EventId, reason: &str) -> Result<()> {
        let mut tables = self.tables.write().await;
        let event = tables
            .rows
            .remove(&event_id)
            .ok_or(EventStoreError::BufferedEventNotFound(event_id))?;
        tables.parked.push(ParkedEvent {
            event,
            reason: reason.to_string(),
            parked_at: Utc::now(),
        });
        Ok(())
    }

    async fn parked(&self) -> Result<Vec<ParkedEvent>> {
        Ok(self.tables.read().await.parked.clone())
    }
}
