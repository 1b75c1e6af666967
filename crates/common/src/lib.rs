//! Shared identifiers for the CRM event-sourcing core.

mod types;

pub use types::{AggregateId, AggregateKey, IdError, ObjectId, Tenant};
