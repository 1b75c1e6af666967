//! Contact aggregate: descriptive data, linked emails and linked locations.

mod aggregate;
mod commands;
mod events;
mod service;

pub use aggregate::{Contact, ContactDataFields, ContactEmail};
pub use commands::*;
pub use events::{
    CONTACT_CREATE_V1, CONTACT_EMAIL_LINK_V1, CONTACT_EMAIL_SET_NON_PRIMARY_V1,
    CONTACT_LOCATION_LINK_V1, CONTACT_UPDATE_V1, ContactCreateData, ContactEmailLinkData,
    ContactEmailSetNonPrimaryData, ContactEvent, ContactLocationLinkData, ContactUpdateData,
};
pub use service::ContactService;
