#![allow(clippy::module_name_repetitions)]
//! Canonical file paths for storage, regions and outputs.
//!
//! Defaults are relative to the project root; the CLI overrides them with
//! flags or the `AIP_STORAGE`/`AIP_REGIONS` environment variables.

use std::path::{Path, PathBuf};

use aip_airac::Airac;

/// Returns the workspace root directory.
///
/// Resolved at compile time from `CARGO_MANIFEST_DIR`.
#[must_use]
pub fn project_root() -> PathBuf {
    let manifest_dir = Path::new(env!("CARGO_MANIFEST_DIR"));
    manifest_dir
        .ancestors()
        .nth(2)
        .unwrap_or(manifest_dir)
        .to_path_buf()
}

/// Default storage root: `data/storage/`.
#[must_use]
pub fn default_storage_dir() -> PathBuf {
    project_root().join("data").join("storage")
}

/// Default directory of region resources: `regions/`.
#[must_use]
pub fn default_regions_dir() -> PathBuf {
    project_root().join("regions")
}

/// Default output directory: `data/output/`.
#[must_use]
pub fn default_output_dir() -> PathBuf {
    project_root().join("data").join("output")
}

/// Persisted configuration file below the storage root.
#[must_use]
pub fn config_path(storage: &Path) -> PathBuf {
    storage.join("config.toml")
}

/// Download cache storage of one region.
#[must_use]
pub fn region_storage_dir(storage: &Path, region: &str) -> PathBuf {
    storage.join(region)
}

/// Resource directory of one region.
#[must_use]
pub fn region_dir(regions: &Path, region: &str) -> PathBuf {
    regions.join(region)
}

/// Base name of the outputs of a run, without extension:
/// `<airac date>_<REGION>_<scope>_<section|all>`.
#[must_use]
pub fn output_stem(airac: Airac, region: &str, scope: &str, section: Option<&str>) -> String {
    format!("{airac}_{region}_{scope}_{}", section.unwrap_or("all"))
}

/// Path of the XML document of a run.
#[must_use]
pub fn document_path(output: &Path, stem: &str) -> PathBuf {
    output.join(format!("{stem}.xml"))
}

/// Path of the feature manifest of a run.
#[must_use]
pub fn manifest_path(output: &Path, stem: &str) -> PathBuf {
    output.join(format!("{stem}.manifest.csv"))
}

/// Ensures a directory exists, creating it if necessary.
///
/// # Errors
///
/// Returns an I/O error if the directory cannot be created.
pub fn ensure_dir(path: &Path) -> std::io::Result<()> {
    if !path.exists() {
        std::fs::create_dir_all(path)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_names_follow_run_parameters() {
        let airac: Airac = "2024-02-01".parse().unwrap();
        let output = Path::new("/out");

        let stem = output_stem(airac, "DEMO", "AIP", None);
        assert_eq!(stem, "2024-01-25_DEMO_AIP_all");
        assert_eq!(
            document_path(output, &stem),
            Path::new("/out/2024-01-25_DEMO_AIP_all.xml")
        );

        let stem = output_stem(airac, "DEMO", "AIP", Some("airports"));
        assert_eq!(
            manifest_path(output, &stem),
            Path::new("/out/2024-01-25_DEMO_AIP_airports.manifest.csv")
        );
    }
}
