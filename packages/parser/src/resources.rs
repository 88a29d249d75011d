//! Per-region lookup data shared by all sections of a run.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use aip_border::{Border, Borders};

/// Fixtures and borders of one region.
///
/// Fixtures are human-maintained TOML tables keyed by file basename;
/// borders are named geometries. Both are read once before any section
/// runs and never change afterwards.
#[derive(Debug, Clone, Default)]
pub struct RegionResources {
    region: String,
    fixtures: BTreeMap<String, toml::Table>,
    borders: Borders,
    source_dir: Option<PathBuf>,
}

impl RegionResources {
    /// Bundles loaded resources for `region`.
    #[must_use]
    pub fn new(region: &str, fixtures: BTreeMap<String, toml::Table>, borders: Borders) -> Self {
        Self {
            region: region.to_owned(),
            fixtures,
            borders,
            source_dir: None,
        }
    }

    /// Sets the directory holding the region's local source files.
    #[must_use]
    pub fn with_source_dir(mut self, dir: &Path) -> Self {
        self.source_dir = Some(dir.to_path_buf());
        self
    }

    /// Path of a local source file of the region. `None` if the region has
    /// no source directory.
    #[must_use]
    pub fn source_file(&self, name: &str) -> Option<PathBuf> {
        self.source_dir.as_ref().map(|dir| dir.join(name))
    }

    /// Region code.
    #[must_use]
    pub fn region(&self) -> &str {
        &self.region
    }

    /// Fixture table by name.
    #[must_use]
    pub fn fixture(&self, name: &str) -> Option<&toml::Table> {
        self.fixtures.get(name)
    }

    /// A single value of a fixture table.
    #[must_use]
    pub fn lookup(&self, fixture: &str, key: &str) -> Option<&toml::Value> {
        self.fixture(fixture)?.get(key)
    }

    /// Names of all loaded fixtures.
    pub fn fixture_names(&self) -> impl Iterator<Item = &str> {
        self.fixtures.keys().map(String::as_str)
    }

    /// Border by name.
    #[must_use]
    pub fn border(&self, name: &str) -> Option<&Border> {
        self.borders.get(name)
    }

    /// All loaded borders.
    #[must_use]
    pub const fn borders(&self) -> &Borders {
        &self.borders
    }
}
