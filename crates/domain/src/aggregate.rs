//! Core aggregate and domain event traits.

use std::collections::HashMap;
use std::fmt::Debug;

use common::{AggregateId, AggregateKey, Tenant};
use event_store::{EventEnvelope, Version};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;

use crate::error::DomainError;

/// Trait for domain events.
///
/// Implementors are adjacently tagged enums (`#[serde(tag = "type", content =
/// "data")]`) whose variant names are the versioned wire names, so the tag
/// doubles as the stored event type and the content is the stored payload.
pub trait DomainEvent: Serialize + DeserializeOwned + Debug + Clone + Send + Sync {
    /// Every event type this enum can decode. Used to reject unknown types
    /// on replay and to check routing tables for completeness.
    const EVENT_TYPES: &'static [&'static str];

    /// Returns the event type name.
    fn event_type(&self) -> &'static str;

    /// Serializes the event payload without its type tag.
    fn encode(&self) -> Result<Value, serde_json::Error> {
        let mut tagged = serde_json::to_value(self)?;
        Ok(tagged
            .get_mut("data")
            .map(Value::take)
            .unwrap_or(Value::Null))
    }

    /// Rebuilds an event from a stored type and payload.
    ///
    /// Returns `Ok(None)` when `event_type` is not one of [`Self::EVENT_TYPES`].
    fn decode(event_type: &str, data: Value) -> Result<Option<Self>, serde_json::Error> {
        if !Self::EVENT_TYPES.contains(&event_type) {
            return Ok(None);
        }
        serde_json::from_value(serde_json::json!({ "type": event_type, "data": data })).map(Some)
    }
}

/// Trait for the state of an event-sourced entity.
///
/// State is only ever changed by [`Aggregate::when`], and only while folding
/// an event. Replaying the same events therefore always yields the same
/// state.
pub trait Aggregate: Default + Debug + Clone + Send + Sync + Sized {
    /// The type of events this aggregate produces and consumes.
    type Event: DomainEvent;

    /// Returns the aggregate type name, used as the stream name prefix.
    fn aggregate_type() -> &'static str;

    /// Folds one event into the state.
    ///
    /// Must be deterministic and free of side effects. Every variant of
    /// `Self::Event` must be handled.
    fn when(&mut self, event: &Self::Event);
}

pub const METADATA_TENANT: &str = "tenant";
pub const METADATA_USER_ID: &str = "user-id";
pub const METADATA_APP: &str = "app";

/// Cross-cutting context stamped onto every event a command emits.
///
/// `propagation` holds distributed-trace carrier entries and is copied into
/// the event metadata verbatim.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventMetadata {
    pub tenant: Tenant,
    pub user_id: String,
    pub app: String,
    pub propagation: HashMap<String, String>,
}

impl EventMetadata {
    pub fn new(tenant: impl Into<Tenant>) -> Self {
        Self {
            tenant: tenant.into(),
            ..Default::default()
        }
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = user_id.into();
        self
    }

    pub fn with_app(mut self, app: impl Into<String>) -> Self {
        self.app = app.into();
        self
    }

    pub fn with_propagation(mut self, propagation: HashMap<String, String>) -> Self {
        self.propagation = propagation;
        self
    }

    /// Renders the metadata as envelope entries. Empty fields are omitted.
    pub fn to_map(&self) -> HashMap<String, Value> {
        let mut map: HashMap<String, Value> = self
            .propagation
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect();

        for (key, value) in [
            (METADATA_TENANT, self.tenant.as_str()),
            (METADATA_USER_ID, self.user_id.as_str()),
            (METADATA_APP, self.app.as_str()),
        ] {
            if !value.is_empty() {
                map.insert(key.to_string(), Value::String(value.to_string()));
            }
        }
        map
    }
}

/// An aggregate instance bound to its stream.
///
/// Created fresh for every command, folded from the stream by
/// [`AggregateStore::load`](crate::AggregateStore::load), then discarded once
/// the command returns. Events decided during the command are applied to the
/// state immediately and held as pending envelopes until saved.
#[derive(Debug, Clone)]
pub struct AggregateRoot<A: Aggregate> {
    id: AggregateId,
    version: Version,
    loaded_version: Version,
    state: A,
    uncommitted: Vec<EventEnvelope>,
}

impl<A: Aggregate> AggregateRoot<A> {
    /// Creates a version-0 instance for the given stream.
    pub fn new(id: AggregateId) -> Self {
        Self {
            id,
            version: Version::initial(),
            loaded_version: Version::initial(),
            state: A::default(),
            uncommitted: Vec::new(),
        }
    }

    pub fn for_key(key: AggregateKey) -> Self {
        Self::new(AggregateId::new(A::aggregate_type(), key))
    }

    pub fn id(&self) -> &AggregateId {
        &self.id
    }

    pub fn key(&self) -> &AggregateKey {
        self.id.key()
    }

    pub fn tenant(&self) -> &Tenant {
        self.id.tenant()
    }

    /// Number of events folded into this instance, pending ones included.
    pub fn version(&self) -> Version {
        self.version
    }

    /// Stream version at the time of the last load or save. Saving expects
    /// the stream to still be at this version.
    pub fn loaded_version(&self) -> Version {
        self.loaded_version
    }

    /// True once at least one event has been folded.
    pub fn exists(&self) -> bool {
        !self.version.is_initial()
    }

    /// Fails with [`DomainError::AggregateNotFound`] for a stream with no
    /// events.
    pub fn ensure_exists(&self) -> Result<(), DomainError> {
        if self.exists() {
            Ok(())
        } else {
            Err(DomainError::AggregateNotFound {
                aggregate_id: self.id.clone(),
            })
        }
    }

    pub fn state(&self) -> &A {
        &self.state
    }

    pub fn into_state(self) -> A {
        self.state
    }

    pub fn uncommitted_events(&self) -> &[EventEnvelope] {
        &self.uncommitted
    }

    pub fn has_uncommitted_events(&self) -> bool {
        !self.uncommitted.is_empty()
    }

    /// Applies a newly decided event.
    pub fn apply(&mut self, event: A::Event) -> Result<(), DomainError> {
        self.apply_with_metadata(event, HashMap::new())
    }

    /// Applies each event in order. Returns how many were applied.
    pub fn apply_all(
        &mut self,
        events: impl IntoIterator<Item = A::Event>,
    ) -> Result<usize, DomainError> {
        let mut applied = 0;
        for event in events {
            self.apply(event)?;
            applied += 1;
        }
        Ok(applied)
    }

    /// Applies a newly decided event carrying pre-existing metadata, such as
    /// an event delivered from the buffer with its original trace context.
    pub fn apply_with_metadata(
        &mut self,
        event: A::Event,
        metadata: HashMap<String, Value>,
    ) -> Result<(), DomainError> {
        let version = self.version.next();
        let envelope = EventEnvelope::builder()
            .aggregate_id(self.id.clone())
            .event_type(event.event_type())
            .version(version)
            .data_raw(event.encode()?)
            .metadata_map(metadata)
            .build()?;

        self.state.when(&event);
        self.version = version;
        self.uncommitted.push(envelope);
        Ok(())
    }

    /// Adds metadata entries to every pending event. Entries an event
    /// already carries are kept.
    pub fn stamp_metadata(&mut self, metadata: &EventMetadata) {
        let entries = metadata.to_map();
        for envelope in &mut self.uncommitted {
            for (key, value) in &entries {
                envelope
                    .metadata
                    .entry(key.clone())
                    .or_insert_with(|| value.clone());
            }
        }
    }

    /// Folds a stored event.
    ///
    /// The event must be the next in sequence, and its type must be one the
    /// aggregate handles.
    pub fn replay(&mut self, envelope: &EventEnvelope) -> Result<(), DomainError> {
        let expected = self.version.next();
        if envelope.version != expected {
            return Err(DomainError::VersionGap {
                aggregate_id: self.id.clone(),
                expected,
                found: envelope.version,
            });
        }

        let event = A::Event::decode(&envelope.event_type, envelope.data.clone())?.ok_or_else(
            || DomainError::InvalidEventType {
                aggregate_type: A::aggregate_type(),
                event_type: envelope.event_type.clone(),
            },
        )?;

        self.state.when(&event);
        self.version = envelope.version;
        self.loaded_version = envelope.version;
        Ok(())
    }

    /// Clears pending events after a successful save and returns them.
    pub fn mark_committed(&mut self) -> Vec<EventEnvelope> {
        self.loaded_version = self.version;
        std::mem::take(&mut self.uncommitted)
    }
}
