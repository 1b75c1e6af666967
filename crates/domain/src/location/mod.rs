//! Location aggregate and its address-validation lifecycle.

mod aggregate;
mod commands;
mod events;
mod service;
mod state;
mod value_objects;

pub use aggregate::{Location, LocationValidation};
pub use commands::*;
pub use events::{
    LOCATION_CREATE_V1, LOCATION_FAILED_VALIDATION_V1, LOCATION_SKIPPED_VALIDATION_V1,
    LOCATION_UPDATE_V1, LOCATION_VALIDATED_V1, LocationCreateData, LocationEvent,
    LocationFailedValidationData, LocationSkippedValidationData, LocationUpdateData,
    LocationValidatedData,
};
pub use service::LocationService;
pub use state::ValidationStatus;
pub use value_objects::AddressDetails;
