//! Command handling infrastructure.

use std::collections::HashMap;
use std::fmt::Debug;
use std::marker::PhantomData;
use std::time::Duration;

use common::{AggregateId, AggregateKey};
use event_store::{EventStore, Version};
use tokio::time::Instant;

use crate::aggregate::{Aggregate, AggregateRoot, EventMetadata};
use crate::error::{DomainError, ValidationError};
use crate::retry::{RetryPolicy, with_optimistic_retry};
use crate::store::AggregateStore;

/// A validated request to change one aggregate.
///
/// Commands never mutate anything themselves. They are inputs to an
/// aggregate method that decides which events, if any, to emit.
pub trait Command: Debug + Send + Sync {
    /// Tenant and entity id of the target aggregate.
    fn aggregate_key(&self) -> &AggregateKey;

    /// Id of the user on whose behalf the command runs.
    fn actor(&self) -> &str;

    /// Name of the application that issued the command.
    fn app_source(&self) -> &str;

    /// Checks required fields. The default only checks the key.
    fn validate(&self) -> Result<(), ValidationError> {
        validate_key(self.aggregate_key())
    }
}

/// Checks that a key has a well-formed tenant and a non-empty object id.
pub fn validate_key(key: &AggregateKey) -> Result<(), ValidationError> {
    if key.tenant.is_empty() {
        return Err(ValidationError::MissingField("tenant"));
    }
    if !key.tenant.is_well_formed() {
        return Err(ValidationError::MalformedTenant(key.tenant.to_string()));
    }
    if key.object_id.is_empty() {
        return Err(ValidationError::MissingField("object_id"));
    }
    Ok(())
}

/// Per-call context: trace propagation entries and an optional deadline.
///
/// Dropping the future returned by [`CommandHandler::handle`] cancels the
/// command; the deadline does the same from the inside.
#[derive(Debug, Clone, Default)]
pub struct CommandContext {
    propagation: HashMap<String, String>,
    deadline: Option<Instant>,
}

impl CommandContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one trace carrier entry (e.g. `uber-trace-id`).
    pub fn with_propagation(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.propagation.insert(key.into(), value.into());
        self
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn propagation(&self) -> &HashMap<String, String> {
        &self.propagation
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }
}

/// Result of a handled command.
#[derive(Debug, Clone)]
pub struct CommandOutcome<A: Aggregate> {
    pub aggregate_id: AggregateId,

    /// Stream version after the command. Unchanged when no event was emitted.
    pub version: Version,

    pub events_emitted: usize,

    /// Attempts it took, 1 when there was no conflict.
    pub attempts: u32,

    /// State of the aggregate after the command.
    pub aggregate: A,
}

impl<A: Aggregate> CommandOutcome<A> {
    pub fn is_no_op(&self) -> bool {
        self.events_emitted == 0
    }
}

/// Runs commands against one aggregate type.
///
/// Every command goes through the same protocol:
/// 1. validate the command, failing fast
/// 2. build a fresh aggregate and load its stream; version 0 means "new"
/// 3. let `decide` read the state and apply the events it chooses
/// 4. stamp tenant, actor, app and trace metadata on those events
/// 5. save; on a version conflict go back to 2 with backoff
pub struct CommandHandler<S, A>
where
    S: EventStore,
    A: Aggregate,
{
    store: AggregateStore<S>,
    policy: RetryPolicy,
    _phantom: PhantomData<A>,
}

impl<S, A> CommandHandler<S, A>
where
    S: EventStore,
    A: Aggregate,
{
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

    pub fn store(&self) -> &AggregateStore<S> {
        &self.store
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Loads an aggregate by key, returning None if it has no events.
    pub async fn load_existing(&self, key: AggregateKey) -> Result<Option<A>, DomainError> {
        let mut root = AggregateRoot::<A>::for_key(key);
        self.store.load(&mut root).await?;
        Ok(root.exists().then(|| root.into_state()))
    }

    /// Handles a command.
    ///
    /// `decide` may run several times, once per attempt, each time against
    /// freshly loaded state. Applying no event is a valid decision and saves
    /// nothing.
    #[tracing::instrument(
        skip_all,
        fields(
            aggregate_type = A::aggregate_type(),
            tenant = %cmd.aggregate_key().tenant,
            object_id = %cmd.aggregate_key().object_id,
        )
    )]
    pub async fn handle<C, F>(
        &self,
        ctx: &CommandContext,
        cmd: &C,
        decide: F,
    ) -> Result<CommandOutcome<A>, DomainError>
    where
        C: Command,
        F: Fn(&mut AggregateRoot<A>) -> Result<(), DomainError> + Send + Sync,
    {
        if let Err(e) = cmd.validate() {
            tracing::debug!(error = %e, "command rejected");
            record_outcome(A::aggregate_type(), "rejected");
            return Err(e.into());
        }

        let aggregate_id = AggregateId::new(A::aggregate_type(), cmd.aggregate_key().clone());
        let metadata = EventMetadata::new(cmd.aggregate_key().tenant.clone())
            .with_user(cmd.actor())
            .with_app(cmd.app_source())
            .with_propagation(ctx.propagation().clone());

        let store = &self.store;
        let aggregate_id = &aggregate_id;
        let metadata = &metadata;
        let decide = &decide;

        let result = with_optimistic_retry(&self.policy, ctx, |attempt| async move {
            let mut root = AggregateRoot::<A>::new(aggregate_id.clone());
            store.load(&mut root).await?;

            decide(&mut root)?;
            root.stamp_metadata(metadata);

            let events_emitted = root.uncommitted_events().len();
            let version = store.save(&mut root).await?;

            Ok(CommandOutcome {
                aggregate_id: aggregate_id.clone(),
                version,
                events_emitted,
                attempts: attempt,
                aggregate: root.into_state(),
            })
        })
        .await;

        match &result {
            Ok(outcome) => {
                tracing::debug!(
                    version = %outcome.version,
                    events = outcome.events_emitted,
                    attempts = outcome.attempts,
                    "command handled"
                );
                record_outcome(A::aggregate_type(), "ok");
            }
            Err(e) => {
                tracing::warn!(error = %e, "command failed");
                record_outcome(A::aggregate_type(), "error");
            }
        }
        result
    }
}

fn record_outcome(aggregate_type: &'static str, outcome: &'static str) {
    metrics::counter!(
        "commands_handled_total",
        "aggregate_type" => aggregate_type,
        "outcome" => outcome
    )
    .increment(1);
}
