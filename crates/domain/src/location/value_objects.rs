//! Value objects for the location domain.

use serde::{Deserialize, Serialize};

/// Structured postal address, as entered or as returned by validation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AddressDetails {
    pub country: String,
    pub region: String,
    pub district: String,
    pub locality: String,
    pub street: String,
    pub address1: String,
    pub address2: String,
    pub zip: String,
    pub postal_code: String,
    pub address_type: String,
    pub house_number: String,
    pub plus_four: String,
    pub commercial: bool,
    pub predirection: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub time_zone: String,
    pub utc_offset: i32,
}

impl AddressDetails {
    pub fn with_country(mut self, country: impl Into<String>) -> Self {
        self.country = country.into();
        self
    }

    pub fn with_locality(mut self, locality: impl Into<String>) -> Self {
        self.locality = locality.into();
        self
    }

    pub fn with_street(
        mut self,
        street: impl Into<String>,
        house_number: impl Into<String>,
    ) -> Self {
        self.street = street.into();
        self.house_number = house_number.into();
        self
    }

    pub fn with_coordinates(mut self, latitude: f64, longitude: f64) -> Self {
        self.latitude = Some(latitude);
        self.longitude = Some(longitude);
        self
    }

    /// True if there is enough structure to attempt validation without a
    /// raw address.
    pub fn is_addressable(&self) -> bool {
        !self.address1.is_empty() || (!self.street.is_empty() && !self.house_number.is_empty())
    }
}
