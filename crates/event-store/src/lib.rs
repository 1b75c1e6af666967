//! Event log and deferred event buffer.
//!
//! - [`EventStore`]: append-only streams keyed by [`AggregateId`] with
//!   expected-version checks on append
//! - [`EventBufferStore`]: durable rows holding events whose application is
//!   deferred until an expiry timestamp
//!
//! Both come with an in-memory backend for tests and a PostgreSQL backend.

pub mod buffer;
pub mod error;
pub mod event;
pub mod memory;
pub mod postgres;
pub mod store;

pub use buffer::{BufferedEvent, EventBufferStore, InMemoryEventBuffer, ParkedEvent};
pub use common::{AggregateId, AggregateKey, ObjectId, Tenant};
pub use error::{EventStoreError, Result};
pub use event::{EventEnvelope, EventEnvelopeBuilder, EventId, Version};
pub use memory::InMemoryEventStore;
pub use postgres::{PostgresEventBuffer, PostgresEventStore, run_migrations};
pub use store::{EventStore, EventStoreExt, validate_events_for_append};
