//! Domain layer of the CRM event-processing core.
//!
//! This crate provides:
//! - Aggregate and DomainEvent traits, and the AggregateRoot that tracks
//!   versions and pending events
//! - AggregateStore for loading and saving aggregates under optimistic
//!   concurrency
//! - CommandHandler with bounded retry on version conflicts
//! - Location aggregate with its address-validation state machine
//! - Contact aggregate with email and location links

pub mod aggregate;
pub mod command;
pub mod contact;
pub mod error;
pub mod location;
pub mod retry;
pub mod source;
pub mod store;

pub use aggregate::{Aggregate, AggregateRoot, DomainEvent, EventMetadata};
pub use command::{Command, CommandContext, CommandHandler, CommandOutcome};
pub use contact::{
    Contact, ContactDataFields, ContactEmail, ContactEvent, ContactService, LinkEmail,
    LinkLocation, SetEmailNonPrimary, UpsertContact,
};
pub use error::{DomainError, ValidationError};
pub use location::{
    AddressDetails, FailLocationValidation, Location, LocationEvent, LocationService,
    PassLocationValidation, SkipLocationValidation, UpsertLocation, ValidationStatus,
};
pub use retry::{RetryPolicy, with_optimistic_retry};
pub use source::SourceFields;
pub use store::AggregateStore;
