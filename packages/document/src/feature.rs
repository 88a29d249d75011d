//! Features and the field-assignment seam.
//!
//! Parsers never mutate a [`Feature`] field directly in the normal code
//! path. They go through a [`FieldWriter`], so that a patch-aware writer can
//! stand in for [`DirectWriter`] while a section's patches are attached.

use std::collections::BTreeMap;

use serde_json::Value;

/// A single feature of the output document.
#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    kind: String,
    id: String,
    fields: BTreeMap<String, Value>,
    source: Option<String>,
}

impl Feature {
    /// Creates a feature of the given type and identity with no fields.
    #[must_use]
    pub fn new(kind: &str, id: &str) -> Self {
        Self {
            kind: kind.to_owned(),
            id: id.to_owned(),
            fields: BTreeMap::new(),
            source: None,
        }
    }

    /// Sets the provenance recorded for diagnostics.
    #[must_use]
    pub fn with_source(mut self, source: &str) -> Self {
        self.source = Some(source.to_owned());
        self
    }

    /// Feature type (e.g. `"Airport"`).
    #[must_use]
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Identity within its type.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Where this feature was extracted from, if recorded.
    #[must_use]
    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    /// Records provenance if none is set yet.
    pub fn stamp_source(&mut self, source: &str) {
        if self.source.is_none() {
            self.source = Some(source.to_owned());
        }
    }

    /// Reads a field.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Reads a string field.
    #[must_use]
    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.fields.get(field).and_then(Value::as_str)
    }

    /// All fields in name order.
    #[must_use]
    pub const fn fields(&self) -> &BTreeMap<String, Value> {
        &self.fields
    }

    /// Assigns a field, bypassing any attached patches.
    pub fn set(&mut self, field: &str, value: Value) {
        self.fields.insert(field.to_owned(), value);
    }

    /// `"kind id"` label used in log messages.
    #[must_use]
    pub fn label(&self) -> String {
        format!("{} {}", self.kind, self.id)
    }
}

/// Strategy for assigning a value to a feature field.
pub trait FieldWriter {
    /// Assigns `value` (or whatever the writer decides on) to `field`.
    fn write(&self, feature: &mut Feature, field: &str, value: Value);
}

/// Assigns values unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectWriter;

impl FieldWriter for DirectWriter {
    fn write(&self, feature: &mut Feature, field: &str, value: Value) {
        feature.set(field, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direct_writer_assigns_verbatim() {
        let mut feature = Feature::new("Airport", "LFSB");
        DirectWriter.write(&mut feature, "name", Value::from("BALE-MULHOUSE"));
        assert_eq!(feature.get_str("name"), Some("BALE-MULHOUSE"));
    }

    #[test]
    fn stamp_source_keeps_existing_provenance() {
        let mut feature = Feature::new("Airport", "LFSB").with_source("airports#12");
        feature.stamp_source("services");
        assert_eq!(feature.source(), Some("airports#12"));

        let mut bare = Feature::new("Airport", "LFST");
        bare.stamp_source("services");
        assert_eq!(bare.source(), Some("services"));
    }
}
