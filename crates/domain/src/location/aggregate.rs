//! Location aggregate implementation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::aggregate::Aggregate;
use crate::source::SourceFields;

use super::{
    AddressDetails, FailLocationValidation, LocationEvent, PassLocationValidation,
    SkipLocationValidation, UpsertLocation, ValidationStatus,
    events::{LocationCreateData, LocationUpdateData},
};

/// Outcome of the most recent validation attempt.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LocationValidation {
    pub status: ValidationStatus,
    pub skip_reason: Option<String>,
    pub validation_error: Option<String>,
    pub skipped_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
    pub validated_at: Option<DateTime<Utc>>,
}

/// A postal location and its validation lifecycle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub name: String,
    pub raw_address: String,
    pub address: AddressDetails,
    pub source: SourceFields,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub validation: LocationValidation,
}

impl Aggregate for Location {
    type Event = LocationEvent;

    fn aggregate_type() -> &'static str {
        "location"
    }

    fn when(&mut self, event: &Self::Event) {
        match event {
            LocationEvent::Create(data) => self.on_create(data),
            LocationEvent::Update(data) => self.on_update(data),
            LocationEvent::FailedValidation(data) => {
                self.validation.status = ValidationStatus::ValidationFailed;
                self.validation.validation_error = Some(data.validation_error.clone());
                self.validation.failed_at = Some(data.validated_at);
            }
            LocationEvent::SkippedValidation(data) => {
                self.validation.status = ValidationStatus::ValidationSkipped;
                self.validation.skip_reason = Some(data.validation_skipped_reason.clone());
                self.validation.skipped_at = Some(data.skipped_at);
            }
            LocationEvent::Validated(data) => {
                self.validation.status = ValidationStatus::Validated;
                self.validation.validation_error = None;
                self.validation.skip_reason = None;
                self.validation.validated_at = Some(data.validated_at);
                self.address = data.address.clone();
            }
        }
    }
}

// Query methods
impl Location {
    pub fn status(&self) -> ValidationStatus {
        self.validation.status
    }

    /// True if the given fields match what is stored.
    pub fn same_data(&self, name: &str, raw_address: &str, address: &AddressDetails) -> bool {
        self.name == name && self.raw_address == raw_address && &self.address == address
    }
}

// Command methods (return events)
impl Location {
    /// Creates the location, or updates it when `exists` is true.
    ///
    /// An update carrying the stored data from the current source of truth
    /// emits nothing. An update without a source keeps the current source of
    /// truth.
    pub fn upsert(&self, exists: bool, cmd: &UpsertLocation) -> Vec<LocationEvent> {
        let tenant = cmd.key.tenant.to_string();

        if !exists {
            let created_at = cmd.created_at.unwrap_or_else(Utc::now);
            return vec![LocationEvent::Create(LocationCreateData {
                tenant,
                name: cmd.name.clone(),
                raw_address: cmd.raw_address.clone(),
                address: cmd.address.clone(),
                source: cmd.source.clone().with_defaults(),
                created_at,
                updated_at: cmd.updated_at.unwrap_or(created_at),
            })];
        }

        let source_changed =
            !cmd.source.source.is_empty() && cmd.source.source != self.source.source_of_truth;
        if !source_changed && self.same_data(&cmd.name, &cmd.raw_address, &cmd.address) {
            return vec![];
        }

        let source = if cmd.source.source.is_empty() {
            self.source.source_of_truth.clone()
        } else {
            cmd.source.source.clone()
        };

        vec![LocationEvent::Update(LocationUpdateData {
            tenant,
            name: cmd.name.clone(),
            raw_address: cmd.raw_address.clone(),
            address: cmd.address.clone(),
            source,
            updated_at: cmd.updated_at.unwrap_or_else(Utc::now),
        })]
    }

    pub fn skip_validation(&self, cmd: &SkipLocationValidation) -> Vec<LocationEvent> {
        vec![LocationEvent::skipped_validation(
            cmd.key.tenant.as_str(),
            self.raw_address_or(&cmd.raw_address),
            cmd.reason.as_str(),
        )]
    }

    pub fn fail_validation(&self, cmd: &FailLocationValidation) -> Vec<LocationEvent> {
        vec![LocationEvent::failed_validation(
            cmd.key.tenant.as_str(),
            self.raw_address_or(&cmd.raw_address),
            cmd.country.as_str(),
            cmd.error.as_str(),
        )]
    }

    pub fn pass_validation(&self, cmd: &PassLocationValidation) -> Vec<LocationEvent> {
        vec![LocationEvent::validated(
            cmd.key.tenant.as_str(),
            self.raw_address_or(&cmd.raw_address),
            cmd.address.clone(),
        )]
    }

    fn raw_address_or(&self, raw_address: &str) -> String {
        if raw_address.is_empty() {
            self.raw_address.clone()
        } else {
            raw_address.to_string()
        }
    }
}

// Apply event helpers
impl Location {
    fn on_create(&mut self, data: &LocationCreateData) {
        self.name = data.name.clone();
        self.raw_address = data.raw_address.clone();
        self.address = data.address.clone();
        self.source = data.source.clone();
        self.created_at = Some(data.created_at);
        self.updated_at = Some(data.updated_at);
        self.validation.status = ValidationStatus::Created;
    }

    fn on_update(&mut self, data: &LocationUpdateData) {
        self.name = data.name.clone();
        self.raw_address = data.raw_address.clone();
        self.address = data.address.clone();
        self.updated_at = Some(data.updated_at);
        if !data.source.is_empty() {
            self.source.source_of_truth = data.source.clone();
        }
    }
}
