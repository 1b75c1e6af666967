//! Contact aggregate implementation.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::aggregate::Aggregate;
use crate::source::{SOURCE_OPENLINE, SourceFields};

use super::{
    ContactEvent, LinkEmail, LinkLocation, SetEmailNonPrimary, UpsertContact,
    events::{ContactCreateData, ContactUpdateData},
};

/// Descriptive fields of a contact.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ContactDataFields {
    pub first_name: String,
    pub last_name: String,
    pub name: String,
    pub prefix: String,
    pub description: String,
    pub timezone: String,
    pub profile_photo_url: String,
}

impl ContactDataFields {
    /// Copies each field of `other` into the blank fields of `self`.
    fn fill_blanks(&mut self, other: &ContactDataFields) {
        for (mine, theirs) in [
            (&mut self.first_name, &other.first_name),
            (&mut self.last_name, &other.last_name),
            (&mut self.name, &other.name),
            (&mut self.prefix, &other.prefix),
            (&mut self.description, &other.description),
            (&mut self.timezone, &other.timezone),
            (&mut self.profile_photo_url, &other.profile_photo_url),
        ] {
            if mine.is_empty() {
                mine.clone_from(theirs);
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactEmail {
    pub label: String,
    pub primary: bool,
}

/// A person in the CRM.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    pub fields: ContactDataFields,
    pub source: SourceFields,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,

    /// Linked emails keyed by email id.
    pub emails: BTreeMap<String, ContactEmail>,

    /// Linked location ids, in link order.
    pub locations: Vec<String>,
}

impl Aggregate for Contact {
    type Event = ContactEvent;

    fn aggregate_type() -> &'static str {
        "contact"
    }

    fn when(&mut self, event: &Self::Event) {
        match event {
            ContactEvent::Create(data) => self.on_create(data),
            ContactEvent::Update(data) => self.on_update(data),
            ContactEvent::EmailLink(data) => {
                self.emails.insert(
                    data.email_id.clone(),
                    ContactEmail {
                        label: data.label.clone(),
                        primary: data.primary,
                    },
                );
                self.updated_at = Some(data.updated_at);
            }
            ContactEvent::EmailSetNonPrimary(data) => {
                if let Some(email) = self.emails.get_mut(&data.email_id) {
                    email.primary = false;
                }
                self.updated_at = Some(data.updated_at);
            }
            ContactEvent::LocationLink(data) => {
                if !self.has_location(&data.location_id) {
                    self.locations.push(data.location_id.clone());
                }
            }
        }
    }
}

// Query methods
impl Contact {
    pub fn same_data(&self, fields: &ContactDataFields) -> bool {
        &self.fields == fields
    }

    pub fn has_email(&self, email_id: &str, label: &str, primary: bool) -> bool {
        self.emails
            .get(email_id)
            .is_some_and(|email| email.label == label && email.primary == primary)
    }

    pub fn primary_email(&self) -> Option<&str> {
        self.emails
            .iter()
            .find(|(_, email)| email.primary)
            .map(|(id, _)| id.as_str())
    }

    pub fn has_location(&self, location_id: &str) -> bool {
        self.locations.iter().any(|id| id == location_id)
    }
}

// Command methods (return events)
impl Contact {
    /// Creates the contact, or updates it when `exists` is true.
    ///
    /// An update carrying the stored data emits nothing.
    pub fn upsert(&self, exists: bool, cmd: &UpsertContact) -> Vec<ContactEvent> {
        let tenant = cmd.key.tenant.to_string();

        if !exists {
            let created_at = cmd.created_at.unwrap_or_else(Utc::now);
            return vec![ContactEvent::Create(ContactCreateData {
                tenant,
                fields: cmd.fields.clone(),
                source: cmd.source.clone().with_defaults(),
                created_at,
                updated_at: cmd.updated_at.unwrap_or(created_at),
            })];
        }

        if self.same_data(&cmd.fields) {
            return vec![];
        }

        let source = if cmd.source.source.is_empty() {
            self.source.source_of_truth.clone()
        } else {
            cmd.source.source.clone()
        };

        vec![ContactEvent::Update(ContactUpdateData {
            tenant,
            fields: cmd.fields.clone(),
            source,
            updated_at: cmd.updated_at.unwrap_or_else(Utc::now),
        })]
    }

    /// Links an email. Linking a primary email demotes any other primary.
    pub fn link_email(&self, cmd: &LinkEmail) -> Vec<ContactEvent> {
        if self.has_email(&cmd.email_id, &cmd.label, cmd.primary) {
            return vec![];
        }

        let tenant = cmd.key.tenant.as_str();
        let mut events = vec![ContactEvent::email_link(
            tenant,
            cmd.email_id.as_str(),
            cmd.label.as_str(),
            cmd.primary,
        )];

        if cmd.primary {
            events.extend(
                self.emails
                    .iter()
                    .filter(|(id, email)| email.primary && **id != cmd.email_id)
                    .map(|(id, _)| ContactEvent::email_set_non_primary(tenant, id.as_str())),
            );
        }
        events
    }

    /// Emits only if the email is linked and currently primary.
    pub fn set_email_non_primary(&self, cmd: &SetEmailNonPrimary) -> Vec<ContactEvent> {
        match self.emails.get(&cmd.email_id) {
            Some(email) if email.primary => vec![ContactEvent::email_set_non_primary(
                cmd.key.tenant.as_str(),
                cmd.email_id.as_str(),
            )],
            _ => vec![],
        }
    }

    pub fn link_location(&self, cmd: &LinkLocation) -> Vec<ContactEvent> {
        if self.has_location(&cmd.location_id) {
            return vec![];
        }
        vec![ContactEvent::location_link(
            cmd.key.tenant.as_str(),
            cmd.location_id.as_str(),
        )]
    }
}

// Apply event helpers
impl Contact {
    fn on_create(&mut self, data: &ContactCreateData) {
        self.fields = data.fields.clone();
        self.source = data.source.clone();
        self.created_at = Some(data.created_at);
        self.updated_at = Some(data.updated_at);
    }

    fn on_update(&mut self, data: &ContactUpdateData) {
        let owned_by_platform = self.source.source_of_truth == SOURCE_OPENLINE;

        if data.source != self.source.source_of_truth && owned_by_platform {
            self.fields.fill_blanks(&data.fields);
        } else {
            self.fields = data.fields.clone();
        }

        self.updated_at = Some(data.updated_at);
        if data.source == SOURCE_OPENLINE {
            self.source.source_of_truth = SOURCE_OPENLINE.to_string();
        }
    }
}
