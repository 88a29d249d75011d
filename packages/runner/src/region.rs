//! Loading of a region's resource directory.
//!
//! ```text
//! <regions>/<REGION>/fixtures/*.toml       fixture tables, keyed by basename
//! <regions>/<REGION>/borders/*.geojson    named borders
//! <regions>/<REGION>/sources/             files for local origins
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use aip_border::Borders;
use aip_parser::RegionResources;

use crate::{RunnerError, paths};

/// Loads fixtures and borders of `region` below `regions`.
///
/// Missing `fixtures/`, `borders/` or `sources/` directories are treated as
/// empty.
///
/// # Errors
///
/// Returns [`RunnerError::Region`] if the region directory does not exist
/// or a fixture is not valid TOML, and [`RunnerError::Border`] if a border
/// cannot be loaded.
pub fn load(regions: &Path, region: &str) -> Result<RegionResources, RunnerError> {
    let dir = paths::region_dir(regions, region);
    if !dir.is_dir() {
        return Err(region_error(
            region,
            format!("no resource directory at {}", dir.display()),
        ));
    }

    let fixtures = load_fixtures(region, &dir.join("fixtures"))?;
    let borders = Borders::load_dir(&dir.join("borders"))?;

    log::info!(
        "Loaded region {region}: {} fixtures, {} borders",
        fixtures.len(),
        borders.len()
    );

    Ok(RegionResources::new(region, fixtures, borders).with_source_dir(&dir.join("sources")))
}

fn load_fixtures(
    region: &str,
    dir: &Path,
) -> Result<BTreeMap<String, toml::Table>, RunnerError> {
    let mut fixtures = BTreeMap::new();
    if !dir.is_dir() {
        return Ok(fixtures);
    }

    for entry in std::fs::read_dir(dir).map_err(RunnerError::io(dir))? {
        let path = entry.map_err(RunnerError::io(dir))?.path();
        if path.extension().and_then(|e| e.to_str()) != Some("toml") {
            continue;
        }
        let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };

        let text = std::fs::read_to_string(&path).map_err(RunnerError::io(&path))?;
        let table = text
            .parse::<toml::Table>()
            .map_err(|e| region_error(region, format!("fixture {}: {e}", path.display())))?;

        log::debug!("Loaded fixture {name} ({} entries)", table.len());
        fixtures.insert(name.to_owned(), table);
    }

    Ok(fixtures)
}

fn region_error(region: &str, message: String) -> RunnerError {
    RunnerError::Region {
        region: region.to_owned(),
        message,
    }
}
