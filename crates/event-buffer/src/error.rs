//! Dispatch error types.

use domain::DomainError;
use event_store::EventStoreError;
use thiserror::Error;

/// Errors that can occur while routing or applying a buffered event.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// No applier handles this event type.
    #[error("No route for event type {event_type}")]
    Unroutable { event_type: String },

    /// Two appliers claim the same event type.
    #[error("Event type {event_type} is already routed to {aggregate_type}")]
    DuplicateRoute {
        event_type: String,
        aggregate_type: &'static str,
    },

    /// The row's stream belongs to a different aggregate type than the one
    /// its event type routes to.
    #[error("Event type {event_type} belongs to {expected}, but the row targets {found}")]
    AggregateMismatch {
        event_type: String,
        expected: &'static str,
        found: String,
    },

    /// Applying the event to its aggregate failed.
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),

    /// The buffer itself could not be read or updated.
    #[error("Event store error: {0}")]
    EventStore(#[from] EventStoreError),
}

/// Result type for dispatch operations.
pub type Result<T> = std::result::Result<T, DispatchError>;
