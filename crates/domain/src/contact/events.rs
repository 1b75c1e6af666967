//! Contact domain events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::aggregate::DomainEvent;
use crate::source::SourceFields;

use super::ContactDataFields;

pub const CONTACT_CREATE_V1: &str = "V1_CONTACT_CREATE";
pub const CONTACT_UPDATE_V1: &str = "V1_CONTACT_UPDATE";
pub const CONTACT_EMAIL_LINK_V1: &str = "V1_CONTACT_EMAIL_LINK";
pub const CONTACT_EMAIL_SET_NON_PRIMARY_V1: &str = "V1_CONTACT_EMAIL_SET_NON_PRIMARY";
pub const CONTACT_LOCATION_LINK_V1: &str = "V1_CONTACT_LOCATION_LINK";

/// Events that can occur on a contact aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ContactEvent {
    #[serde(rename = "V1_CONTACT_CREATE")]
    Create(ContactCreateData),

    #[serde(rename = "V1_CONTACT_UPDATE")]
    Update(ContactUpdateData),

    #[serde(rename = "V1_CONTACT_EMAIL_LINK")]
    EmailLink(ContactEmailLinkData),

    #[serde(rename = "V1_CONTACT_EMAIL_SET_NON_PRIMARY")]
    EmailSetNonPrimary(ContactEmailSetNonPrimaryData),

    #[serde(rename = "V1_CONTACT_LOCATION_LINK")]
    LocationLink(ContactLocationLinkData),
}

impl DomainEvent for ContactEvent {
    const EVENT_TYPES: &'static [&'static str] = &[
        CONTACT_CREATE_V1,
        CONTACT_UPDATE_V1,
        CONTACT_EMAIL_LINK_V1,
        CONTACT_EMAIL_SET_NON_PRIMARY_V1,
        CONTACT_LOCATION_LINK_V1,
    ];

    fn event_type(&self) -> &'static str {
        match self {
            ContactEvent::Create(_) => CONTACT_CREATE_V1,
            ContactEvent::Update(_) => CONTACT_UPDATE_V1,
            ContactEvent::EmailLink(_) => CONTACT_EMAIL_LINK_V1,
            ContactEvent::EmailSetNonPrimary(_) => CONTACT_EMAIL_SET_NON_PRIMARY_V1,
            ContactEvent::LocationLink(_) => CONTACT_LOCATION_LINK_V1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactCreateData {
    pub tenant: String,
    #[serde(flatten)]
    pub fields: ContactDataFields,
    pub source: SourceFields,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactUpdateData {
    pub tenant: String,
    #[serde(flatten)]
    pub fields: ContactDataFields,

    /// Source of this update.
    pub source: String,

    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactEmailLinkData {
    pub tenant: String,
    pub email_id: String,
    pub label: String,
    pub primary: bool,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactEmailSetNonPrimaryData {
    pub tenant: String,
    pub email_id: String,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactLocationLinkData {
    pub tenant: String,
    pub location_id: String,
    pub updated_at: DateTime<Utc>,
}

// Convenience constructors
impl ContactEvent {
    pub fn email_link(
        tenant: impl Into<String>,
        email_id: impl Into<String>,
        label: impl Into<String>,
        primary: bool,
    ) -> Self {
        ContactEvent::EmailLink(ContactEmailLinkData {
            tenant: tenant.into(),
            email_id: email_id.into(),
            label: label.into(),
            primary,
            updated_at: Utc::now(),
        })
    }

    pub fn email_set_non_primary(tenant: impl Into<String>, email_id: impl Into<String>) -> Self {
        ContactEvent::EmailSetNonPrimary(ContactEmailSetNonPrimaryData {
            tenant: tenant.into(),
            email_id: email_id.into(),
            updated_at: Utc::now(),
        })
    }

    pub fn location_link(tenant: impl Into<String>, location_id: impl Into<String>) -> Self {
        ContactEvent::LocationLink(ContactLocationLinkData {
            tenant: tenant.into(),
            location_id: location_id.into(),
            updated_at: Utc::now(),
        })
    }
}
