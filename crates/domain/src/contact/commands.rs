//! Contact commands.

use chrono::{DateTime, Utc};
use common::{AggregateKey, ObjectId, Tenant};

use crate::command::{Command, validate_key};
use crate::error::ValidationError;
use crate::source::SourceFields;

use super::ContactDataFields;

/// Command to create a contact, or update it if it already exists.
#[derive(Debug, Clone)]
pub struct UpsertContact {
    pub key: AggregateKey,
    pub logged_in_user_id: String,
    pub fields: ContactDataFields,
    pub source: SourceFields,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl UpsertContact {
    pub fn new(key: AggregateKey, fields: ContactDataFields) -> Self {
        Self {
            key,
            logged_in_user_id: String::new(),
            fields,
            source: SourceFields::default(),
            created_at: None,
            updated_at: None,
        }
    }

    /// Creates an upsert for a new contact with a generated id.
    pub fn create(tenant: impl Into<Tenant>, fields: ContactDataFields) -> Self {
        Self::new(AggregateKey::new(tenant, ObjectId::generate()), fields)
    }

    pub fn with_source(mut self, source: SourceFields) -> Self {
        self.source = source;
        self
    }

    pub fn by_user(mut self, user_id: impl Into<String>) -> Self {
        self.logged_in_user_id = user_id.into();
        self
    }
}

impl Command for UpsertContact {
    fn aggregate_key(&self) -> &AggregateKey {
        &self.key
    }

    fn actor(&self) -> &str {
        &self.logged_in_user_id
    }

    fn app_source(&self) -> &str {
        &self.source.app_source
    }
}

#[derive(Debug, Clone)]
pub struct LinkEmail {
    pub key: AggregateKey,
    pub logged_in_user_id: String,
    pub app_source: String,
    pub email_id: String,
    pub label: String,
    pub primary: bool,
}

impl LinkEmail {
    pub fn new(
        key: AggregateKey,
        email_id: impl Into<String>,
        label: impl Into<String>,
        primary: bool,
    ) -> Self {
        Self {
            key,
            logged_in_user_id: String::new(),
            app_source: String::new(),
            email_id: email_id.into(),
            label: label.into(),
            primary,
        }
    }

    pub fn by_user(mut self, user_id: impl Into<String>) -> Self {
        self.logged_in_user_id = user_id.into();
        self
    }
}

impl Command for LinkEmail {
    fn aggregate_key(&self) -> &AggregateKey {
        &self.key
    }

    fn actor(&self) -> &str {
        &self.logged_in_user_id
    }

    fn app_source(&self) -> &str {
        &self.app_source
    }

    fn validate(&self) -> Result<(), ValidationError> {
        validate_key(&self.key)?;
        if self.email_id.is_empty() {
            return Err(ValidationError::MissingField("email_id"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct SetEmailNonPrimary {
    pub key: AggregateKey,
    pub logged_in_user_id: String,
    pub app_source: String,
    pub email_id: String,
}

impl SetEmailNonPrimary {
    pub fn new(key: AggregateKey, email_id: impl Into<String>) -> Self {
        Self {
            key,
            logged_in_user_id: String::new(),
            app_source: String::new(),
            email_id: email_id.into(),
        }
    }
}

impl Command for SetEmailNonPrimary {
    fn aggregate_key(&self) -> &AggregateKey {
        &self.key
    }

    fn actor(&self) -> &str {
        &self.logged_in_user_id
    }

    fn app_source(&self) -> &str {
        &self.app_source
    }

    fn validate(&self) -> Result<(), ValidationError> {
        validate_key(&self.key)?;
        if self.email_id.is_empty() {
            return Err(ValidationError::MissingField("email_id"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct LinkLocation {
    pub key: AggregateKey,
    pub logged_in_user_id: String,
    pub app_source: String,
    pub location_id: String,
}

impl LinkLocation {
    pub fn new(key: AggregateKey, location_id: impl Into<String>) -> Self {
        Self {
            key,
            logged_in_user_id: String::new(),
            app_source: String::new(),
            location_id: location_id.into(),
        }
    }

    pub fn by_user(mut self, user_id: impl Into<String>) -> Self {
        self.logged_in_user_id = user_id.into();
        self
    }
}

impl Command for LinkLocation {
    fn aggregate_key(&self) -> &AggregateKey {
        &self.key
    }

    fn actor(&self) -> &str {
        &self.logged_in_user_id
    }

    fn app_source(&self) -> &str {
        &self.app_source
    }

    fn validate(&self) -> Result<(), ValidationError> {
        validate_key(&self.key)?;
        if self.location_id.is_empty() {
            return Err(ValidationError::MissingField("location_id"));
        }
        Ok(())
    }
}
