use async_trait::async_trait;

use crate::{AggregateId, EventEnvelope, EventStoreError, Result, Version};

/// Core trait for event log backends.
///
/// Streams are keyed by [`AggregateId`]. Backends must serialise concurrent
/// appends to the same stream (so at most one append at a given expected
/// version succeeds) while letting appends to different streams proceed in
/// parallel. All implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Reads every event of a stream in ascending version order.
    ///
    /// An unknown stream yields an empty list, not an error.
    async fn read_stream(&self, aggregate_id: &AggregateId) -> Result<Vec<EventEnvelope>>;

    /// Appends events to a stream atomically.
    ///
    /// Fails with [`EventStoreError::ConcurrencyConflict`] if the stream is
    /// not currently at `expected_version`. Returns the stream's new version.
    async fn append_to_stream(
        &self,
        aggregate_id: &AggregateId,
        expected_version: Version,
        events: Vec<EventEnvelope>,
    ) -> Result<Version>;

    /// Gets the current version of a stream, or None if it has no events.
    async fn stream_version(&self, aggregate_id: &AggregateId) -> Result<Option<Version>>;
}

/// Extension trait providing convenience methods for event stores.
#[async_trait]
pub trait EventStoreExt: EventStore {
    /// Checks whether a stream has any events.
    async fn stream_exists(&self, aggregate_id: &AggregateId) -> Result<bool> {
        Ok(self.stream_version(aggregate_id).await?.is_some())
    }
}

impl<T: EventStore + ?Sized> EventStoreExt for T {}

#[async_trait]
impl<T: EventStore + ?Sized> EventStore for std::sync::Arc<T> {
    async fn read_stream(&self, aggregate_id: &AggregateId) -> Result<Vec<EventEnvelope>> {
        (**self).read_stream(aggregate_id).await
    }

    async fn append_to_stream(
        &self,
        aggregate_id: &AggregateId,
        expected_version: Version,
        events: Vec<EventEnvelope>,
    ) -> Result<Version> {
        (**self)
            .append_to_stream(aggregate_id, expected_version, events)
            .await
    }

    async fn stream_version(&self, aggregate_id: &AggregateId) -> Result<Option<Version>> {
        (**self).stream_version(aggregate_id).await
    }
}

/// Validates that a batch is a gap-free continuation of `aggregate_id`'s
/// stream from `expected_version`.
pub fn validate_events_for_append(
    aggregate_id: &AggregateId,
    expected_version: Version,
    events: &[EventEnvelope],
) -> Result<()> {
    if events.is_empty() {
        return Err(EventStoreError::InvalidAppend(
            "cannot append empty event list".to_string(),
        ));
    }

    let mut version = expected_version;
    for event in events {
        if &event.aggregate_id != aggregate_id {
            return Err(EventStoreError::InvalidAppend(format!(
                "event {} belongs to {}, not {}",
                event.event_id, event.aggregate_id, aggregate_id
            )));
        }
        version = version.next();
        if event.version != version {
            return Err(EventStoreError::InvalidAppend(format!(
                "event versions must be sequential: expected {}, got {}",
                version, event.version
            )));
        }
    }

    Ok(())
}
