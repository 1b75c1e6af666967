//! Location service providing the command API for locations.

use common::AggregateKey;
use event_store::EventStore;

use crate::command::{CommandContext, CommandHandler, CommandOutcome};
use crate::error::DomainError;
use crate::retry::RetryPolicy;

use super::{
    FailLocationValidation, Location, PassLocationValidation, SkipLocationValidation,
    UpsertLocation,
};

/// Service for managing locations.
///
/// Upserts create the location when it has no events yet. The validation
/// commands require the location to exist and fail with
/// [`DomainError::AggregateNotFound`] otherwise.
pub struct LocationService<S: EventStore> {
    handler: CommandHandler<S, Location>,
}

impl<S: EventStore> LocationService<S> {
    pub fn new(store: S) -> Self {
        Self {
            handler: CommandHandler::new(store),
        }
    }

    pub fn with_policy(store: S, policy: RetryPolicy) -> Self {
        Self {
            handler: CommandHandler::with_policy(store, policy),
        }
    }

    pub fn handler(&self) -> &CommandHandler<S, Location> {
        &self.handler
    }

    #[tracing::instrument(skip(self, ctx))]
    pub async fn upsert_location(
        &self,
        ctx: &CommandContext,
        cmd: UpsertLocation,
    ) -> Result<CommandOutcome<Location>, DomainError> {
        self.handler
            .handle(ctx, &cmd, |root| {
                let events = root.state().upsert(root.exists(), &cmd);
                root.apply_all(events)?;
                Ok(())
            })
            .await
    }

    #[tracing::instrument(skip(self, ctx))]
    pub async fn skip_validation(
        &self,
        ctx: &CommandContext,
        cmd: SkipLocationValidation,
    ) -> Result<CommandOutcome<Location>, DomainError> {
        self.handler
            .handle(ctx, &cmd, |root| {
                root.ensure_exists()?;
                let events = root.state().skip_validation(&cmd);
                root.apply_all(events)?;
                Ok(())
            })
            .await
    }

    #[tracing::instrument(skip(self, ctx))]
    pub async fn fail_validation(
        &self,
        ctx: &CommandContext,
        cmd: FailLocationValidation,
    ) -> Result<CommandOutcome<Location>, DomainError> {
        self.handler
            .handle(ctx, &cmd, |root| {
                root.ensure_exists()?;
                let events = root.state().fail_validation(&cmd);
                root.apply_all(events)?;
                Ok(())
            })
            .await
    }

    #[tracing::instrument(skip(self, ctx))]
    pub async fn mark_validated(
        &self,
        ctx: &CommandContext,
        cmd: PassLocationValidation,
    ) -> Result<CommandOutcome<Location>, DomainError> {
        self.handler
            .handle(ctx, &cmd, |root| {
                root.ensure_exists()?;
                let events = root.state().pass_validation(&cmd);
                root.apply_all(events)?;
                Ok(())
            })
            .await
    }

    /// Loads a location by key.
    ///
    /// Returns None if the location doesn't exist.
    #[tracing::instrument(skip(self))]
    pub async fn get_location(&self, key: AggregateKey) -> Result<Option<Location>, DomainError> {
        self.handler.load_existing(key).await
    }
}
