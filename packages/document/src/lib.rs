#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! The in-memory output document shared by all section parsers.
//!
//! A [`Document`] is a flat, ordered collection of [`Feature`]s. Sections
//! add features and look up features added by earlier sections via
//! [`Document::find_by`]. Once every section has run the document is
//! validated ([`Document::errors`], [`Document::duplicates`]) and
//! serialized ([`Document::to_xml`]).

pub mod feature;
mod xml;

use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;

pub use feature::{DirectWriter, Feature, FieldWriter};

/// Errors from document serialization.
#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    /// Writing XML failed.
    #[error("XML error: {0}")]
    Xml(String),
}

/// A validation finding for a single feature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureError {
    /// `"kind id"` of the offending feature.
    pub feature: String,
    /// Provenance of the offending feature.
    pub source: Option<String>,
    /// What is wrong with it.
    pub message: String,
}

impl std::fmt::Display for FeatureError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: {} (source: {})",
            self.feature,
            self.message,
            self.source.as_deref().unwrap_or("unknown")
        )
    }
}

/// The feature collection under construction.
#[derive(Debug, Clone, Default)]
pub struct Document {
    namespace: String,
    effective: String,
    region: String,
    features: Vec<Feature>,
    /// Required fields per feature type.
    required: BTreeMap<String, Vec<String>>,
}

impl Document {
    /// Creates an empty document.
    ///
    /// `namespace` is the stable identifier persisted in the config,
    /// `effective` the AIRAC date and `region` the region code; all three
    /// end up in the XML header.
    #[must_use]
    pub fn new(namespace: &str, effective: &str, region: &str) -> Self {
        Self {
            namespace: namespace.to_owned(),
            effective: effective.to_owned(),
            region: region.to_owned(),
            features: Vec::new(),
            required: BTreeMap::new(),
        }
    }

    /// Declares fields every feature of `kind` must carry.
    pub fn require(&mut self, kind: &str, fields: &[&str]) {
        self.required
            .entry(kind.to_owned())
            .or_default()
            .extend(fields.iter().map(|&f| f.to_owned()));
    }

    /// Appends a feature.
    pub fn add(&mut self, feature: Feature) {
        self.features.push(feature);
    }

    /// All features of `kind` whose fields match every `(field, value)`
    /// filter. The pseudo-field `"id"` matches the feature identity.
    #[must_use]
    pub fn find_by(&self, kind: &str, filters: &[(&str, Value)]) -> Vec<&Feature> {
        self.features
            .iter()
            .filter(|f| f.kind() == kind)
            .filter(|f| {
                filters.iter().all(|(field, value)| {
                    if *field == "id" {
                        value.as_str() == Some(f.id())
                    } else {
                        f.get(field) == Some(value)
                    }
                })
            })
            .collect()
    }

    /// Mutable access to the first feature of `kind` with identity `id`.
    pub fn find_mut(&mut self, kind: &str, id: &str) -> Option<&mut Feature> {
        self.features
            .iter_mut()
            .find(|f| f.kind() == kind && f.id() == id)
    }

    /// All features in insertion order.
    #[must_use]
    pub fn features(&self) -> &[Feature] {
        &self.features
    }

    /// Number of features.
    #[must_use]
    pub fn len(&self) -> usize {
        self.features.len()
    }

    /// Whether the document has no features.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Stable namespace identifier.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Schema-level findings: empty identities and missing required fields.
    #[must_use]
    pub fn errors(&self) -> Vec<FeatureError> {
        let mut errors = Vec::new();

        for feature in &self.features {
            let mut report = |message: String| {
                errors.push(FeatureError {
                    feature: feature.label(),
                    source: feature.source().map(str::to_owned),
                    message,
                });
            };

            if feature.id().trim().is_empty() {
                report("empty identity".to_string());
            }

            if let Some(fields) = self.required.get(feature.kind()) {
                for field in fields {
                    match feature.get(field) {
                        None | Some(Value::Null) => {
                            report(format!("missing required field '{field}'"));
                        }
                        Some(_) => {}
                    }
                }
            }
        }

        errors
    }

    /// Features whose `(kind, id)` was already used by an earlier feature.
    #[must_use]
    pub fn duplicates(&self) -> Vec<&Feature> {
        let mut seen = BTreeSet::new();
        let mut duplicates = Vec::new();
        for feature in &self.features {
            if !seen.insert((feature.kind(), feature.id())) {
                log::debug!(
                    "Duplicate {} (source: {})",
                    feature.label(),
                    feature.source().unwrap_or("unknown")
                );
                duplicates.push(feature);
            }
        }
        duplicates
    }

    /// Whether the document has neither invalid nor duplicate features.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.errors().is_empty() && self.duplicates().is_empty()
    }

    /// Serializes the document.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentError::Xml`] if the writer fails.
    pub fn to_xml(&self) -> Result<String, DocumentError> {
        let xml = xml::write(self)?;
        log::debug!(
            "Serialized {} features for {} ({} bytes)",
            self.features.len(),
            self.region,
            xml.len()
        );
        Ok(xml)
    }
}
