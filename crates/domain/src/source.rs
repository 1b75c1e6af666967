//! Provenance fields shared by every aggregate.

use serde::{Deserialize, Serialize};

/// Source written when a command does not name one.
pub const SOURCE_OPENLINE: &str = "openline";

/// App source written when a command does not name one.
pub const DEFAULT_APP_SOURCE: &str = "event-processing-platform";

/// Where a piece of data came from and which source currently owns it.
///
/// `source_of_truth` decides whose updates win: once the platform itself is
/// the source of truth, updates from other sources only fill blank fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SourceFields {
    pub source: String,
    pub source_of_truth: String,
    pub app_source: String,
}

impl SourceFields {
    pub fn new(source: impl Into<String>, app_source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            source_of_truth: String::new(),
            app_source: app_source.into(),
        }
    }

    /// Fills blank fields with defaults. A blank source of truth takes the
    /// source.
    pub fn with_defaults(mut self) -> Self {
        if self.source.is_empty() {
            self.source = SOURCE_OPENLINE.to_string();
        }
        if self.source_of_truth.is_empty() {
            self.source_of_truth = self.source.clone();
        }
        if self.app_source.is_empty() {
            self.app_source = DEFAULT_APP_SOURCE.to_string();
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_only_blank_fields() {
        let fields = SourceFields::new("hubspot", "").with_defaults();
        assert_eq!(fields.source, "hubspot");
        assert_eq!(fields.source_of_truth, "hubspot");
        assert_eq!(fields.app_source, DEFAULT_APP_SOURCE);

        let fields = SourceFields::default().with_defaults();
        assert_eq!(fields.source, SOURCE_OPENLINE);
        assert_eq!(fields.source_of_truth, SOURCE_OPENLINE);
    }
}
