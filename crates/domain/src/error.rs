//! Domain error types.

use common::AggregateId;
use event_store::{EventStoreError, Version};
use thiserror::Error;

/// Reasons a command is rejected before any I/O happens.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{0} is required")]
    MissingField(&'static str),

    #[error("tenant {0:?} is malformed: tenant names must not contain '-'")]
    MalformedTenant(String),

    #[error("{field} is invalid: {reason}")]
    InvalidField {
        field: &'static str,
        reason: String,
    },
}

/// Errors that can occur during domain operations.
#[derive(Debug, Error)]
pub enum DomainError {
    /// Bad command input. Never retried.
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// A stored event has a type the aggregate has no handler for.
    #[error("Invalid event type {event_type} for aggregate {aggregate_type}")]
    InvalidEventType {
        aggregate_type: &'static str,
        event_type: String,
    },

    /// Replay found a stream whose versions are not contiguous.
    #[error("Version gap in {aggregate_id}: expected version {expected}, found {found}")]
    VersionGap {
        aggregate_id: AggregateId,
        expected: Version,
        found: Version,
    },

    /// The aggregate has no events and the caller requires it to exist.
    #[error("Aggregate not found: {aggregate_id}")]
    AggregateNotFound { aggregate_id: AggregateId },

    /// Every attempt ended in a version conflict.
    #[error("Gave up after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        last: Box<DomainError>,
    },

    /// The command context deadline passed before the command completed.
    #[error("Deadline exceeded")]
    DeadlineExceeded,

    /// An error occurred in the event store.
    #[error("Event store error: {0}")]
    EventStore(#[from] EventStoreError),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DomainError {
    /// Returns true for the optimistic-concurrency failure that the retry
    /// helper recovers from.
    pub fn is_version_conflict(&self) -> bool {
        matches!(self, DomainError::EventStore(e) if e.is_concurrency_conflict())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::AggregateKey;

    #[test]
    fn only_store_conflicts_are_version_conflicts() {
        let id = AggregateId::new("location", AggregateKey::new("t1", "l1"));
        let conflict = DomainError::EventStore(EventStoreError::ConcurrencyConflict {
            aggregate_id: id.clone(),
            expected: Version::new(3),
            actual: Version::new(4),
        });
        assert!(conflict.is_version_conflict());

        let not_found = DomainError::AggregateNotFound { aggregate_id: id };
        assert!(!not_found.is_version_conflict());

        let invalid = DomainError::from(EventStoreError::InvalidAppend("empty".into()));
        assert!(!invalid.is_version_conflict());

        let exhausted = DomainError::RetriesExhausted {
            attempts: 3,
            last: Box::new(conflict),
        };
        assert!(!exhausted.is_version_conflict());
    }
}
