//! Field patches.
//!
//! A [`Patch`] intercepts assignments of one field on one feature type
//! while its section is being parsed. The callback sees the section name,
//! the region resources, the AIRAC cycle, the target feature and the value
//! the extraction rule wants to assign, and answers with an [`Override`].
//!
//! ```ignore
//! Patch::new("Airport", "name", |scope, feature, _value| {
//!     scope
//!         .resources
//!         .lookup("airport_names", feature.id())
//!         .and_then(toml::Value::as_str)
//!         .map_or(Override::Keep, |name| Override::Replace(name.into()))
//! })
//! ```

use std::collections::BTreeMap;
use std::fmt;

use aip_airac::Airac;
use aip_document::{Feature, FieldWriter};
use serde_json::Value;

use crate::RegionResources;

/// What a patch decides for an intercepted assignment.
#[derive(Debug, Clone, PartialEq)]
pub enum Override {
    /// Assign this value instead.
    Replace(Value),
    /// Assign the original value unchanged.
    Keep,
}

/// What a patch callback can see besides the feature and value.
#[derive(Debug, Clone, Copy)]
pub struct PatchScope<'a> {
    /// Section whose parse is running.
    pub section: &'a str,
    /// Fixtures and borders of the region.
    pub resources: &'a RegionResources,
    /// Cycle being converted.
    pub airac: Airac,
}

type PatchFn = dyn Fn(&PatchScope<'_>, &Feature, &Value) -> Override + Send + Sync;

/// An interceptor for one `(feature type, field)` pair.
pub struct Patch {
    kind: String,
    field: String,
    callback: Box<PatchFn>,
}

impl Patch {
    /// Creates a patch for `field` of features of type `kind`.
    #[must_use]
    pub fn new<F>(kind: &str, field: &str, callback: F) -> Self
    where
        F: Fn(&PatchScope<'_>, &Feature, &Value) -> Override + Send + Sync + 'static,
    {
        Self {
            kind: kind.to_owned(),
            field: field.to_owned(),
            callback: Box::new(callback),
        }
    }

    /// Feature type this patch applies to.
    #[must_use]
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Field this patch applies to.
    #[must_use]
    pub fn field(&self) -> &str {
        &self.field
    }

    /// Runs the callback.
    #[must_use]
    pub fn apply(&self, scope: &PatchScope<'_>, feature: &Feature, value: &Value) -> Override {
        (self.callback)(scope, feature, value)
    }
}

impl fmt::Debug for Patch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Patch")
            .field("kind", &self.kind)
            .field("field", &self.field)
            .finish_non_exhaustive()
    }
}

/// The patches of one section, at most one per `(feature type, field)`.
#[derive(Debug, Default)]
pub struct PatchSet {
    patches: BTreeMap<(String, String), Patch>,
}

impl PatchSet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a patch, builder style.
    #[must_use]
    pub fn with(mut self, patch: Patch) -> Self {
        self.insert(patch);
        self
    }

    /// Adds a patch, replacing an earlier one for the same field.
    pub fn insert(&mut self, patch: Patch) {
        let key = (patch.kind.clone(), patch.field.clone());
        if self.patches.insert(key, patch).is_some() {
            log::warn!("Replaced an earlier patch for the same field");
        }
    }

    /// The patch for `field` of `kind`, if any.
    #[must_use]
    pub fn get(&self, kind: &str, field: &str) -> Option<&Patch> {
        self.patches.get(&(kind.to_owned(), field.to_owned()))
    }

    /// Number of patches.
    #[must_use]
    pub fn len(&self) -> usize {
        self.patches.len()
    }

    /// Whether the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.patches.is_empty()
    }
}

/// Writer that consults a [`PatchSet`] before assigning.
#[derive(Debug)]
pub struct PatchedWriter<'a> {
    patches: &'a PatchSet,
    scope: PatchScope<'a>,
}

impl<'a> PatchedWriter<'a> {
    /// Creates a writer applying `patches` within `scope`.
    #[must_use]
    pub const fn new(patches: &'a PatchSet, scope: PatchScope<'a>) -> Self {
        Self { patches, scope }
    }
}

impl FieldWriter for PatchedWriter<'_> {
    fn write(&self, feature: &mut Feature, field: &str, value: Value) {
        let Some(patch) = self.patches.get(feature.kind(), field) else {
            feature.set(field, value);
            return;
        };

        match patch.apply(&self.scope, feature, &value) {
            Override::Replace(replacement) => {
                log::debug!(
                    "[{}] {}.{field}: {value} patched to {replacement}",
                    self.scope.section,
                    feature.label(),
                );
                feature.set(field, replacement);
            }
            Override::Keep => feature.set(field, value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upcase_names() -> PatchSet {
        PatchSet::new().with(Patch::new("Airport", "name", |_, _, value| {
            value
                .as_str()
                .map_or(Override::Keep, |s| Override::Replace(s.to_uppercase().into()))
        }))
    }

    #[test]
    fn patched_writer_replaces_only_matching_fields() {
        let resources = RegionResources::default();
        let patches = upcase_names();
        let scope = PatchScope {
            section: "airports",
            resources: &resources,
            airac: Airac::new(chrono_date(2024, 1, 25)).unwrap(),
        };
        let writer = PatchedWriter::new(&patches, scope);

        let mut airport = Feature::new("Airport", "LFSB");
        writer.write(&mut airport, "name", Value::from("Bale"));
        writer.write(&mut airport, "city", Value::from("Bale"));
        assert_eq!(airport.get_str("name"), Some("BALE"));
        assert_eq!(airport.get_str("city"), Some("Bale"));

        let mut navaid = Feature::new("Navaid", "BSL");
        writer.write(&mut navaid, "name", Value::from("Basel"));
        assert_eq!(navaid.get_str("name"), Some("Basel"));

        // Non-string value: callback keeps the original.
        writer.write(&mut airport, "name", Value::from(1));
        assert_eq!(airport.get("name"), Some(&Value::from(1)));
    }

    #[test]
    fn later_patch_for_same_field_wins() {
        let mut patches = upcase_names();
        patches.insert(Patch::new("Airport", "name", |_, _, _| {
            Override::Replace("fixed".into())
        }));
        assert_eq!(patches.len(), 1);

        let resources = RegionResources::default();
        let scope = PatchScope {
            section: "airports",
            resources: &resources,
            airac: Airac::new(chrono_date(2024, 1, 25)).unwrap(),
        };
        let mut airport = Feature::new("Airport", "LFSB");
        PatchedWriter::new(&patches, scope).write(&mut airport, "name", Value::from("Bale"));
        assert_eq!(airport.get_str("name"), Some("fixed"));
    }

    fn chrono_date(year: i32, month: u32, day: u32) -> aip_airac::NaiveDate {
        aip_airac::NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }
}
