//! Location validation state machine.

use serde::{Deserialize, Serialize};

/// Where a location is in its validation lifecycle.
///
/// ```text
///           ┌──► ValidationSkipped
/// Created ──┼──► ValidationFailed
///           └──► Validated
/// ```
///
/// A later validation result replaces an earlier one, so any of the three
/// outcomes may follow any other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ValidationStatus {
    /// Created or updated, no validation result yet.
    #[default]
    Created,

    /// Validation was not attempted (e.g. missing country).
    ValidationSkipped,

    /// The validation service rejected the address.
    ValidationFailed,

    /// The address was validated and normalised.
    Validated,
}

impl ValidationStatus {
    /// Returns true while no validation outcome has been recorded.
    pub fn is_pending(&self) -> bool {
        matches!(self, ValidationStatus::Created)
    }

    pub fn is_validated(&self) -> bool {
        matches!(self, ValidationStatus::Validated)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationStatus::Created => "Created",
            ValidationStatus::ValidationSkipped => "ValidationSkipped",
            ValidationStatus::ValidationFailed => "ValidationFailed",
            ValidationStatus::Validated => "Validated",
        }
    }
}

impl std::fmt::Display for ValidationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
