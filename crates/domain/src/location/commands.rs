//! Location commands.

use chrono::{DateTime, Utc};
use common::{AggregateKey, ObjectId, Tenant};

use crate::command::{Command, validate_key};
use crate::error::ValidationError;
use crate::source::SourceFields;

use super::AddressDetails;

/// Command to create a location, or update it if it already exists.
#[derive(Debug, Clone)]
pub struct UpsertLocation {
    pub key: AggregateKey,
    pub logged_in_user_id: String,
    pub name: String,
    pub raw_address: String,
    pub address: AddressDetails,
    pub source: SourceFields,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl UpsertLocation {
    pub fn new(key: AggregateKey, raw_address: impl Into<String>) -> Self {
        Self {
            key,
            logged_in_user_id: String::new(),
            name: String::new(),
            raw_address: raw_address.into(),
            address: AddressDetails::default(),
            source: SourceFields::default(),
            created_at: None,
            updated_at: None,
        }
    }

    /// Creates an upsert for a new location with a generated id.
    pub fn create(tenant: impl Into<Tenant>, raw_address: impl Into<String>) -> Self {
        Self::new(AggregateKey::new(tenant, ObjectId::generate()), raw_address)
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_address(mut self, address: AddressDetails) -> Self {
        self.address = address;
        self
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

impl Command for UpsertLocation {
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

/// Command recording that validation was not attempted.
#[derive(Debug, Clone)]
pub struct SkipLocationValidation {
    pub key: AggregateKey,
    pub logged_in_user_id: String,
    pub app_source: String,

    /// Address the decision was made on. Empty means the stored one.
    pub raw_address: String,

    pub reason: String,
}

impl SkipLocationValidation {
    pub fn new(key: AggregateKey, reason: impl Into<String>) -> Self {
        Self {
            key,
            logged_in_user_id: String::new(),
            app_source: String::new(),
            raw_address: String::new(),
            reason: reason.into(),
        }
    }

    pub fn with_raw_address(mut self, raw_address: impl Into<String>) -> Self {
        self.raw_address = raw_address.into();
        self
    }

    pub fn from_app(mut self, app_source: impl Into<String>) -> Self {
        self.app_source = app_source.into();
        self
    }
}

impl Command for SkipLocationValidation {
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
        if self.reason.trim().is_empty() {
            return Err(ValidationError::MissingField("reason"));
        }
        Ok(())
    }
}

/// Command recording that the validation service rejected the address.
#[derive(Debug, Clone)]
pub struct FailLocationValidation {
    pub key: AggregateKey,
    pub logged_in_user_id: String,
    pub app_source: String,
    pub raw_address: String,
    pub country: String,
    pub error: String,
}

impl FailLocationValidation {
    pub fn new(key: AggregateKey, country: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            key,
            logged_in_user_id: String::new(),
            app_source: String::new(),
            raw_address: String::new(),
            country: country.into(),
            error: error.into(),
        }
    }

    pub fn with_raw_address(mut self, raw_address: impl Into<String>) -> Self {
        self.raw_address = raw_address.into();
        self
    }

    pub fn from_app(mut self, app_source: impl Into<String>) -> Self {
        self.app_source = app_source.into();
        self
    }
}

impl Command for FailLocationValidation {
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
        if self.error.trim().is_empty() {
            return Err(ValidationError::MissingField("error"));
        }
        Ok(())
    }
}

/// Command recording a successful validation and its normalised address.
#[derive(Debug, Clone)]
pub struct PassLocationValidation {
    pub key: AggregateKey,
    pub logged_in_user_id: String,
    pub app_source: String,
    pub raw_address: String,
    pub address: AddressDetails,
}

impl PassLocationValidation {
    pub fn new(key: AggregateKey, address: AddressDetails) -> Self {
        Self {
            key,
            logged_in_user_id: String::new(),
            app_source: String::new(),
            raw_address: String::new(),
            address,
        }
    }

    pub fn with_raw_address(mut self, raw_address: impl Into<String>) -> Self {
        self.raw_address = raw_address.into();
        self
    }

    pub fn from_app(mut self, app_source: impl Into<String>) -> Self {
        self.app_source = app_source.into();
        self
    }
}

impl Command for PassLocationValidation {
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
        if self.address.country.is_empty() {
            return Err(ValidationError::MissingField("address.country"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_generates_object_id() {
        let a = UpsertLocation::create("t1", "1 Main St");
        let b = UpsertLocation::create("t1", "1 Main St");
        assert_ne!(a.key.object_id, b.key.object_id);
        assert!(a.validate().is_ok());
    }

    #[test]
    fn skip_requires_reason() {
        let cmd = SkipLocationValidation::new(AggregateKey::new("t1", "l1"), "  ");
        assert_eq!(cmd.validate(), Err(ValidationError::MissingField("reason")));
    }

    #[test]
    fn fail_requires_error() {
        let cmd = FailLocationValidation::new(AggregateKey::new("t1", "l1"), "US", "");
        assert_eq!(cmd.validate(), Err(ValidationError::MissingField("error")));
    }

    #[test]
    fn pass_requires_country() {
        let cmd = PassLocationValidation::new(AggregateKey::new("t1", "l1"), AddressDetails::default());
        assert_eq!(
            cmd.validate(),
            Err(ValidationError::MissingField("address.country"))
        );
    }

    #[test]
    fn tenant_must_not_contain_separator() {
        let cmd = UpsertLocation::new(AggregateKey::new("acme-eu", "l1"), "x");
        assert!(matches!(
            cmd.validate(),
            Err(ValidationError::MalformedTenant(_))
        ));
    }
}
