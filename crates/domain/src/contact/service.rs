//! Contact service providing the command API for contacts.

use common::AggregateKey;
use event_store::EventStore;

use crate::command::{CommandContext, CommandHandler, CommandOutcome};
use crate::error::DomainError;
use crate::retry::RetryPolicy;

use super::{Contact, LinkEmail, LinkLocation, SetEmailNonPrimary, UpsertContact};

/// Service for managing contacts.
pub struct ContactService<S: EventStore> {
    handler: CommandHandler<S, Contact>,
}

impl<S: EventStore> ContactService<S> {
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

    pub fn handler(&self) -> &CommandHandler<S, Contact> {
        &self.handler
    }

    #[tracing::instrument(skip(self, ctx))]
    pub async fn upsert_contact(
        &self,
        ctx: &CommandContext,
        cmd: UpsertContact,
    ) -> Result<CommandOutcome<Contact>, DomainError> {
        self.handler
            .handle(ctx, &cmd, |root| {
                let events = root.state().upsert(root.exists(), &cmd);
                root.apply_all(events)?;
                Ok(())
            })
            .await
    }

    #[tracing::instrument(skip(self, ctx))]
    pub async fn link_email(
        &self,
        ctx: &CommandContext,
        cmd: LinkEmail,
    ) -> Result<CommandOutcome<Contact>, DomainError> {
        self.handler
            .handle(ctx, &cmd, |root| {
                root.ensure_exists()?;
                let events = root.state().link_email(&cmd);
                root.apply_all(events)?;
                Ok(())
            })
            .await
    }

    #[tracing::instrument(skip(self, ctx))]
    pub async fn set_email_non_primary(
        &self,
        ctx: &CommandContext,
        cmd: SetEmailNonPrimary,
    ) -> Result<CommandOutcome<Contact>, DomainError> {
        self.handler
            .handle(ctx, &cmd, |root| {
                root.ensure_exists()?;
                let events = root.state().set_email_non_primary(&cmd);
                root.apply_all(events)?;
                Ok(())
            })
            .await
    }

    #[tracing::instrument(skip(self, ctx))]
    pub async fn link_location(
        &self,
        ctx: &CommandContext,
        cmd: LinkLocation,
    ) -> Result<CommandOutcome<Contact>, DomainError> {
        self.handler
            .handle(ctx, &cmd, |root| {
                root.ensure_exists()?;
                let events = root.state().link_location(&cmd);
                root.apply_all(events)?;
                Ok(())
            })
            .await
    }

    /// Loads a contact by key, or None if it has no events.
    #[tracing::instrument(skip(self))]
    pub async fn get_contact(&self, key: AggregateKey) -> Result<Option<Contact>, DomainError> {
        self.handler.load_existing(key).await
    }
}
