//! Applying a buffered event to the aggregate it targets.

use std::marker::PhantomData;

use async_trait::async_trait;
use domain::{
    Aggregate, AggregateRoot, AggregateStore, CommandContext, DomainError, DomainEvent,
    RetryPolicy, with_optimistic_retry,
};
use event_store::{BufferedEvent, EventStore, Version};

use crate::{DispatchError, Result};

/// Applies buffered events of the types one aggregate owns.
#[async_trait]
pub trait EventApplier: Send + Sync {
    /// Aggregate type whose streams this applier writes to.
    fn aggregate_type(&self) -> &'static str;

    /// Event types this applier accepts.
    fn event_types(&self) -> &'static [&'static str];

    /// Applies the row's event and returns the new stream version.
    async fn apply(&self, event: &BufferedEvent) -> Result<Version>;
}

/// [`EventApplier`] that runs the load, apply and save cycle for aggregate
/// `A`, retrying on version conflicts.
///
/// The event is appended at whatever version the stream has when it is
/// delivered, not the version recorded when it was scheduled. Its metadata,
/// trace context included, is carried over unchanged.
pub struct AggregateApplier<S, A> {
    store: AggregateStore<S>,
    policy: RetryPolicy,
    _phantom: PhantomData<fn() -> A>,
}

impl<S: EventStore, A: Aggregate> AggregateApplier<S, A> {
    pub fn new(store: S) -> Self {
        Self::with_policy(store, RetryPolicy::default())
    }

    pub fn with_policy(store: S, policy: RetryPolicy) -> Self {
        Self {
            store: AggregateStore::new(store),
            policy,
            _phantom: PhantomData,
        }
    }

    fn decode(&self, row: &BufferedEvent) -> Result<A::Event> {
        let event = A::Event::decode(&row.event_type, row.data.clone())
            .map_err(DomainError::from)?
            .ok_or_else(|| DomainError::InvalidEventType {
                aggregate_type: A::aggregate_type(),
                event_type: row.event_type.clone(),
            })?;
        Ok(event)
    }
}

#[async_trait]
impl<S, A> EventApplier for AggregateApplier<S, A>
where
    S: EventStore,
    A: Aggregate,
{
    fn aggregate_type(&self) -> &'static str {
        A::aggregate_type()
    }

    fn event_types(&self) -> &'static [&'static str] {
        <A::Event as DomainEvent>::EVENT_TYPES
    }

    #[tracing::instrument(
        skip_all,
        fields(event_id = %row.event_id, event_type = %row.event_type, stream = %row.aggregate_id)
    )]
    async fn apply(&self, row: &BufferedEvent) -> Result<Version> {
        if row.aggregate_id.aggregate_type() != A::aggregate_type() {
            return Err(DispatchError::AggregateMismatch {
                event_type: row.event_type.clone(),
                expected: A::aggregate_type(),
                found: row.aggregate_id.aggregate_type().to_string(),
            });
        }

        let event = self.decode(row)?;
        let store = &self.store;
        let event = &event;

        let version = with_optimistic_retry(&self.policy, &CommandContext::new(), |_| async move {
            let mut root = AggregateRoot::<A>::new(row.aggregate_id.clone());
            store.load(&mut root).await?;
            root.apply_with_metadata(event.clone(), row.metadata.clone())?;
            store.save(&mut root).await
        })
        .await?;

        tracing::debug!(version = %version, "buffered event applied");
        Ok(version)
    }
}
