//! Aggregate persistence on top of an event log.

use common::AggregateId;
use event_store::{EventStore, EventStoreExt, Version};

use crate::aggregate::{Aggregate, AggregateRoot};
use crate::error::DomainError;

/// Loads aggregates by replaying their stream and saves the events they
/// decided with an expected-version check.
#[derive(Debug, Clone)]
pub struct AggregateStore<S> {
    events: S,
}

impl<S: EventStore> AggregateStore<S> {
    pub fn new(events: S) -> Self {
        Self { events }
    }

    /// Returns a reference to the underlying event log.
    pub fn events(&self) -> &S {
        &self.events
    }

    /// Cheap presence check.
    pub async fn exists(&self, aggregate_id: &AggregateId) -> Result<bool, DomainError> {
        Ok(self.events.stream_exists(aggregate_id).await?)
    }

    /// Folds every stored event into `root`.
    ///
    /// A stream with no events leaves the root at version 0; that is not an
    /// error here.
    #[tracing::instrument(skip(self, root), fields(stream = %root.id()))]
    pub async fn load<A: Aggregate>(&self, root: &mut AggregateRoot<A>) -> Result<(), DomainError> {
        let events = self.events.read_stream(root.id()).await?;
        for envelope in &events {
            root.replay(envelope)?;
        }
        tracing::trace!(version = %root.version(), "aggregate loaded");
        Ok(())
    }

    /// Loads an aggregate that must already exist.
    pub async fn load_existing<A: Aggregate>(
        &self,
        aggregate_id: AggregateId,
    ) -> Result<AggregateRoot<A>, DomainError> {
        let mut root = AggregateRoot::new(aggregate_id);
        self.load(&mut root).await?;
        root.ensure_exists()?;
        Ok(root)
    }

    /// Appends the events decided since the last load.
    ///
    /// The append only succeeds if the stream is still at the version `root`
    /// was loaded at. On success the pending events are cleared and the new
    /// stream version returned. With nothing pending this is a no-op.
    #[tracing::instrument(skip(self, root), fields(stream = %root.id(), expected = %root.loaded_version()))]
    pub async fn save<A: Aggregate>(
        &self,
        root: &mut AggregateRoot<A>,
    ) -> Result<Version, DomainError> {
        if !root.has_uncommitted_events() {
            return Ok(root.version());
        }

        let version = self
            .events
            .append_to_stream(
                root.id(),
                root.loaded_version(),
                root.uncommitted_events().to_vec(),
            )
            .await?;
        root.mark_committed();
        Ok(version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::{Location, LocationEvent};
    use common::AggregateKey;
    use event_store::InMemoryEventStore;

    fn skipped(reason: &str) -> LocationEvent {
        LocationEvent::skipped_validation("t1", "1 Main St", reason)
    }

    #[tokio::test]
    async fn save_then_load_round_trips() {
        let store = AggregateStore::new(InMemoryEventStore::new());
        let key = AggregateKey::new("t1", "loc-1");

        let mut root = AggregateRoot::<Location>::for_key(key.clone());
        root.apply(skipped("first")).unwrap();
        root.apply(skipped("second")).unwrap();
        let version = store.save(&mut root).await.unwrap();
        assert_eq!(version, Version::new(2));
        assert!(!root.has_uncommitted_events());
        assert_eq!(root.loaded_version(), Version::new(2));

        let loaded: AggregateRoot<Location> = store
            .load_existing(AggregateId::new("location", key))
            .await
            .unwrap();
        assert_eq!(loaded.version(), Version::new(2));
        assert_eq!(
            loaded.state().validation.skip_reason.as_deref(),
            Some("second")
        );
    }

    #[tokio::test]
    async fn load_of_unknown_stream_stays_at_zero() {
        let store = AggregateStore::new(InMemoryEventStore::new());
        let mut root = AggregateRoot::<Location>::for_key(AggregateKey::new("t1", "missing"));

        store.load(&mut root).await.unwrap();
        assert_eq!(root.version(), Version::initial());
        assert!(!store.exists(root.id()).await.unwrap());

        let result = store.load_existing::<Location>(root.id().clone()).await;
        assert!(matches!(result, Err(DomainError::AggregateNotFound { .. })));
    }

    #[tokio::test]
    async fn save_without_pending_events_is_a_no_op() {
        let events = InMemoryEventStore::new();
        let store = AggregateStore::new(events.clone());
        let mut root = AggregateRoot::<Location>::for_key(AggregateKey::new("t1", "loc-2"));

        let version = store.save(&mut root).await.unwrap();
        assert_eq!(version, Version::initial());
        assert_eq!(events.event_count().await, 0);
    }

    #[tokio::test]
    async fn stale_save_is_a_version_conflict() {
        let store = AggregateStore::new(InMemoryEventStore::new());
        let key = AggregateKey::new("t1", "loc-3");

        let mut first = AggregateRoot::<Location>::for_key(key.clone());
        let mut second = AggregateRoot::<Location>::for_key(key);
        store.load(&mut first).await.unwrap();
        store.load(&mut second).await.unwrap();

        first.apply(skipped("a")).unwrap();
        second.apply(skipped("b")).unwrap();

        store.save(&mut first).await.unwrap();
        let err = store.save(&mut second).await.unwrap_err();
        assert!(err.is_version_conflict());
        assert!(second.has_uncommitted_events());
        assert!(store.exists(first.id()).await.unwrap());
    }

    #[tokio::test]
    async fn load_surfaces_unknown_event_types() {
        let events = InMemoryEventStore::new();
        let store = AggregateStore::new(events.clone());
        let id = AggregateId::new("location", AggregateKey::new("t1", "loc-4"));

        let envelope = event_store::EventEnvelope::builder()
            .aggregate_id(id.clone())
            .event_type("V1_LOCATION_DELETE")
            .version(Version::first())
            .data_raw(serde_json::json!({}))
            .build()
            .unwrap();
        events
            .append_to_stream(&id, Version::initial(), vec![envelope])
            .await
            .unwrap();

        let result = store.load_existing::<Location>(id).await;
        assert!(matches!(result, Err(DomainError::InvalidEventType { .. })));
    }
}
