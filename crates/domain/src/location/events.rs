//! Location domain events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::aggregate::DomainEvent;
use crate::source::SourceFields;

use super::AddressDetails;

pub const LOCATION_CREATE_V1: &str = "V1_LOCATION_CREATE";
pub const LOCATION_UPDATE_V1: &str = "V1_LOCATION_UPDATE";
pub const LOCATION_FAILED_VALIDATION_V1: &str = "V1_LOCATION_FAILED_VALIDATION";
pub const LOCATION_SKIPPED_VALIDATION_V1: &str = "V1_LOCATION_SKIPPED_VALIDATION";
pub const LOCATION_VALIDATED_V1: &str = "V1_LOCATION_VALIDATED";

/// Events that can occur on a location aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum LocationEvent {
    #[serde(rename = "V1_LOCATION_CREATE")]
    Create(LocationCreateData),

    #[serde(rename = "V1_LOCATION_UPDATE")]
    Update(LocationUpdateData),

    #[serde(rename = "V1_LOCATION_FAILED_VALIDATION")]
    FailedValidation(LocationFailedValidationData),

    #[serde(rename = "V1_LOCATION_SKIPPED_VALIDATION")]
    SkippedValidation(LocationSkippedValidationData),

    #[serde(rename = "V1_LOCATION_VALIDATED")]
    Validated(LocationValidatedData),
}

impl DomainEvent for LocationEvent {
    const EVENT_TYPES: &'static [&'static str] = &[
        LOCATION_CREATE_V1,
        LOCATION_UPDATE_V1,
        LOCATION_FAILED_VALIDATION_V1,
        LOCATION_SKIPPED_VALIDATION_V1,
        LOCATION_VALIDATED_V1,
    ];

    fn event_type(&self) -> &'static str {
        match self {
            LocationEvent::Create(_) => LOCATION_CREATE_V1,
            LocationEvent::Update(_) => LOCATION_UPDATE_V1,
            LocationEvent::FailedValidation(_) => LOCATION_FAILED_VALIDATION_V1,
            LocationEvent::SkippedValidation(_) => LOCATION_SKIPPED_VALIDATION_V1,
            LocationEvent::Validated(_) => LOCATION_VALIDATED_V1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationCreateData {
    pub tenant: String,
    pub name: String,
    pub raw_address: String,
    pub address: AddressDetails,
    pub source: SourceFields,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationUpdateData {
    pub tenant: String,
    pub name: String,
    pub raw_address: String,
    pub address: AddressDetails,

    /// Source of this update. Becomes the source of truth.
    pub source: String,

    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationFailedValidationData {
    pub tenant: String,
    pub raw_address: String,
    pub country: String,
    pub validation_error: String,
    pub validated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationSkippedValidationData {
    pub tenant: String,
    pub raw_address: String,
    pub validation_skipped_reason: String,
    pub skipped_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationValidatedData {
    pub tenant: String,
    pub raw_address: String,
    pub address: AddressDetails,
    pub validated_at: DateTime<Utc>,
}

// Convenience constructors
impl LocationEvent {
    pub fn skipped_validation(
        tenant: impl Into<String>,
        raw_address: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        LocationEvent::SkippedValidation(LocationSkippedValidationData {
            tenant: tenant.into(),
            raw_address: raw_address.into(),
            validation_skipped_reason: reason.into(),
            skipped_at: Utc::now(),
        })
    }

    pub fn failed_validation(
        tenant: impl Into<String>,
        raw_address: impl Into<String>,
        country: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        LocationEvent::FailedValidation(LocationFailedValidationData {
            tenant: tenant.into(),
            raw_address: raw_address.into(),
            country: country.into(),
            validation_error: error.into(),
            validated_at: Utc::now(),
        })
    }

    pub fn validated(
        tenant: impl Into<String>,
        raw_address: impl Into<String>,
        address: AddressDetails,
    ) -> Self {
        LocationEvent::Validated(LocationValidatedData {
            tenant: tenant.into(),
            raw_address: raw_address.into(),
            address,
            validated_at: Utc::now(),
        })
    }
}
