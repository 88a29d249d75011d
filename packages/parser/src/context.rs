//! Everything a section parser works with during its run.

use std::fmt;
use std::path::PathBuf;

use aip_airac::Airac;
use aip_border::Border;
use aip_document::{DirectWriter, Document, Feature, FieldWriter};
use aip_source::{DownloadCache, Origin, ParsedDocument, SourceError};
use serde_json::Value;

use crate::patch::{PatchScope, PatchSet, PatchedWriter};
use crate::{ParseError, RegionResources};

/// Running count of non-fatal problems.
#[derive(Debug, Default)]
pub struct Warnings {
    count: usize,
}

impl Warnings {
    /// Creates a zero counter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Logs `message` under `context` and counts it.
    pub fn warn(&mut self, context: &str, message: impl fmt::Display) {
        self.count += 1;
        log::warn!("[{context}] {message}");
    }

    /// Number of warnings so far.
    #[must_use]
    pub const fn count(&self) -> usize {
        self.count
    }
}

/// The state one section's parse runs against.
///
/// Holds the download cache session, the shared output document, the
/// region resources and, while attached, the section's patches. Field
/// assignments made through [`ParseContext::set`] and
/// [`ParseContext::update`] go through the patches; [`Feature::set`]
/// bypasses them.
pub struct ParseContext<'a> {
    cache: &'a mut DownloadCache,
    document: &'a mut Document,
    resources: &'a RegionResources,
    warnings: &'a mut Warnings,
    airac: Airac,
    section: String,
    patches: Option<PatchSet>,
}

impl<'a> ParseContext<'a> {
    /// Creates the context for parsing `section`.
    #[must_use]
    pub fn new(
        cache: &'a mut DownloadCache,
        document: &'a mut Document,
        resources: &'a RegionResources,
        warnings: &'a mut Warnings,
        airac: Airac,
        section: &str,
    ) -> Self {
        Self {
            cache,
            document,
            resources,
            warnings,
            airac,
            section: section.to_owned(),
            patches: None,
        }
    }

    /// Section being parsed.
    #[must_use]
    pub fn section(&self) -> &str {
        &self.section
    }

    /// Cycle being converted.
    #[must_use]
    pub const fn airac(&self) -> Airac {
        self.airac
    }

    /// Region fixtures and borders.
    #[must_use]
    pub const fn resources(&self) -> &'a RegionResources {
        self.resources
    }

    /// A fixture table by name.
    #[must_use]
    pub fn fixture(&self, name: &str) -> Option<&'a toml::Table> {
        self.resources.fixture(name)
    }

    /// A border by name.
    #[must_use]
    pub fn border(&self, name: &str) -> Option<&'a Border> {
        self.resources.border(name)
    }

    /// The shared output document.
    #[must_use]
    pub fn document(&self) -> &Document {
        self.document
    }

    /// Reads a source document through the download cache.
    ///
    /// # Errors
    ///
    /// See [`DownloadCache::read`].
    pub async fn read(
        &mut self,
        document: &str,
        origin: &Origin,
    ) -> Result<ParsedDocument, SourceError> {
        self.cache.read(document, origin).await
    }

    /// Fetches a source document through the download cache without
    /// decoding it.
    ///
    /// # Errors
    ///
    /// See [`DownloadCache::read_raw`].
    pub async fn read_raw(
        &mut self,
        document: &str,
        origin: &Origin,
    ) -> Result<PathBuf, SourceError> {
        self.cache.read_raw(document, origin).await
    }

    /// Assigns a field through the attached patches, if any.
    pub fn set(&self, feature: &mut Feature, field: &str, value: Value) {
        let scope = PatchScope {
            section: &self.section,
            resources: self.resources,
            airac: self.airac,
        };
        write_field(self.patches.as_ref(), scope, feature, field, value);
    }

    /// Assigns a field of a feature already in the document, through the
    /// attached patches. Returns `false` if there is no such feature.
    pub fn update(&mut self, kind: &str, id: &str, field: &str, value: Value) -> bool {
        let scope = PatchScope {
            section: &self.section,
            resources: self.resources,
            airac: self.airac,
        };
        let Some(feature) = self.document.find_mut(kind, id) else {
            return false;
        };
        write_field(self.patches.as_ref(), scope, feature, field, value);
        true
    }

    /// Adds a feature to the document, recording this section as its
    /// provenance unless it already has one.
    pub fn add(&mut self, mut feature: Feature) {
        feature.stamp_source(&self.section);
        self.document.add(feature);
    }

    /// Logs and counts a non-fatal problem.
    pub fn warn(&mut self, message: impl fmt::Display) {
        self.warnings.warn(&self.section, message);
    }

    /// Builds an extraction error for this section.
    #[must_use]
    pub fn extraction_error(&self, message: impl fmt::Display) -> ParseError {
        ParseError::Extraction {
            section: self.section.clone(),
            message: message.to_string(),
        }
    }

    /// Activates `patches` for subsequent field assignments.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::PatchesAlreadyAttached`] if a set is already
    /// attached; the attached set stays in place.
    pub fn attach_patches(&mut self, patches: PatchSet) -> Result<(), ParseError> {
        if self.patches.is_some() {
            return Err(ParseError::PatchesAlreadyAttached(self.section.clone()));
        }
        log::trace!("[{}] attaching {} patches", self.section, patches.len());
        self.patches = Some(patches);
        Ok(())
    }

    /// Deactivates and returns the attached patches.
    pub fn detach_patches(&mut self) -> Option<PatchSet> {
        let patches = self.patches.take();
        if let Some(patches) = &patches {
            log::trace!("[{}] detaching {} patches", self.section, patches.len());
        }
        patches
    }

    /// Whether patches are currently attached.
    #[must_use]
    pub const fn patches_attached(&self) -> bool {
        self.patches.is_some()
    }
}

fn write_field(
    patches: Option<&PatchSet>,
    scope: PatchScope<'_>,
    feature: &mut Feature,
    field: &str,
    value: Value,
) {
    match patches {
        Some(patches) => PatchedWriter::new(patches, scope).write(feature, field, value),
        None => DirectWriter.write(feature, field, value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patch::{Override, Patch};
    use aip_source::{HttpClient, HttpSettings};

    fn suffix_patches() -> PatchSet {
        PatchSet::new().with(Patch::new("Airport", "name", |scope, _, value| {
            Override::Replace(format!("{} ({})", value.as_str().unwrap_or(""), scope.section).into())
        }))
    }

    #[test]
    fn patches_attach_and_detach_round_trip() {
        let storage = std::env::temp_dir().join("aip_parser_context_patches");
        let _ = std::fs::remove_dir_all(&storage);
        std::fs::create_dir_all(&storage).unwrap();

        let http = HttpClient::new(&HttpSettings::default()).unwrap();
        let mut cache = DownloadCache::open(&storage, "src", true, http).unwrap();
        let mut document = Document::new("ns", "2024-01-25", "DEMO");
        let resources = RegionResources::default();
        let mut warnings = Warnings::new();
        let airac: Airac = "2024-01-25".parse().unwrap();

        let mut ctx = ParseContext::new(
            &mut cache,
            &mut document,
            &resources,
            &mut warnings,
            airac,
            "airports",
        );

        let mut before = Feature::new("Airport", "LFSB");
        ctx.set(&mut before, "name", Value::from("Bale"));
        assert_eq!(before.get_str("name"), Some("Bale"));

        ctx.attach_patches(suffix_patches()).unwrap();
        assert!(matches!(
            ctx.attach_patches(PatchSet::new()),
            Err(ParseError::PatchesAlreadyAttached(_))
        ));

        let mut during = Feature::new("Airport", "LFST");
        ctx.set(&mut during, "name", Value::from("Strasbourg"));
        assert_eq!(during.get_str("name"), Some("Strasbourg (airports)"));

        // Raw setter bypasses patches.
        during.set("name", Value::from("Strasbourg"));
        assert_eq!(during.get_str("name"), Some("Strasbourg"));

        ctx.add(during);
        assert!(ctx.update("Airport", "LFST", "name", Value::from("Entzheim")));
        assert!(!ctx.update("Airport", "LFGA", "name", Value::from("Colmar")));

        let detached = ctx.detach_patches().unwrap();
        assert_eq!(detached.len(), 1);
        assert!(!ctx.patches_attached());
        assert!(ctx.detach_patches().is_none());

        let mut after = Feature::new("Airport", "LFGA");
        ctx.set(&mut after, "name", Value::from("Colmar"));
        assert_eq!(after.get_str("name"), Some("Colmar"));

        ctx.warn("something odd");
        drop(ctx);

        assert_eq!(warnings.count(), 1);
        let stored = document.find_by("Airport", &[("id", Value::from("LFST"))])[0];
        assert_eq!(stored.get_str("name"), Some("Entzheim (airports)"));
        assert_eq!(stored.source(), Some("airports"));

        cache.close().unwrap();
        let _ = std::fs::remove_dir_all(&storage);
    }
}
