//! Zip and tar.gz archive utilities.
//!
//! The download cache persists its scratch directory as one flat zip
//! archive per source identifier. Archive origins (local or downloaded)
//! extract a single entry from either a zip or a gzip-compressed tar
//! archive, detected by magic bytes rather than by extension.

use std::fs::File;
use std::io::{self, Read as _};
use std::path::Path;

use flate2::read::GzDecoder;
use zip::result::ZipError;
use zip::write::SimpleFileOptions;

use crate::SourceError;

const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
const ZIP_EMPTY_MAGIC: &[u8] = b"PK\x05\x06";
const GZIP_MAGIC: &[u8] = &[0x1f, 0x8b];

/// Packs the regular, non-hidden files of `dir` into a flat zip archive.
///
/// Entries are added in name order. Returns the number of entries written.
///
/// # Errors
///
/// Returns [`SourceError::Io`] if the directory cannot be read or the
/// archive cannot be written.
pub fn pack(dir: &Path, archive_path: &Path) -> Result<u64, SourceError> {
    log::debug!("Packing {} -> {}", dir.display(), archive_path.display());

    let mut names = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(SourceError::io(dir))? {
        let entry = entry.map_err(SourceError::io(dir))?;
        let Ok(name) = entry.file_name().into_string() else {
            log::warn!("Skipping non UTF-8 file name in {}", dir.display());
            continue;
        };
        if name.starts_with('.') || !entry.path().is_file() {
            continue;
        }
        names.push(name);
    }
    names.sort();

    let file = File::create(archive_path).map_err(SourceError::io(archive_path))?;
    let mut writer = zip::ZipWriter::new(file);
    let options =
        SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    for name in &names {
        let path = dir.join(name);
        writer.start_file(name.as_str(), options)?;
        let mut input = File::open(&path).map_err(SourceError::io(&path))?;
        io::copy(&mut input, &mut writer).map_err(SourceError::io(&path))?;
    }

    writer.finish()?;

    log::debug!("  packed {} entries", names.len());

    Ok(names.len() as u64)
}

/// Unpacks a zip archive into `dest_dir`, creating it if needed.
///
/// Returns the number of entries extracted.
///
/// # Errors
///
/// Returns [`SourceError::NotFound`] if the archive does not exist and
/// [`SourceError::Zip`] if it is corrupt.
pub fn unpack(archive_path: &Path, dest_dir: &Path) -> Result<u64, SourceError> {
    if !archive_path.is_file() {
        return Err(SourceError::NotFound(archive_path.display().to_string()));
    }

    log::debug!(
        "Unpacking {} -> {}",
        archive_path.display(),
        dest_dir.display()
    );

    std::fs::create_dir_all(dest_dir).map_err(SourceError::io(dest_dir))?;

    let file = File::open(archive_path).map_err(SourceError::io(archive_path))?;
    let mut archive = zip::ZipArchive::new(file)?;
    let count = archive.len() as u64;
    archive.extract(dest_dir)?;

    log::debug!("  extracted {count} entries");

    Ok(count)
}

/// Extracts the entry at `entry` of a zip or tar.gz archive to `dest`.
///
/// # Errors
///
/// Returns [`SourceError::NotFound`] if the archive or the entry does not
/// exist and [`SourceError::InvalidArgument`] if the file is neither a zip
/// nor a gzip-compressed tar archive.
pub fn extract_entry(archive_path: &Path, entry: &str, dest: &Path) -> Result<(), SourceError> {
    if !archive_path.is_file() {
        return Err(SourceError::NotFound(archive_path.display().to_string()));
    }

    let mut magic = [0u8; 4];
    let read = File::open(archive_path)
        .and_then(|mut f| f.read(&mut magic))
        .map_err(SourceError::io(archive_path))?;
    let magic = &magic[..read];

    if magic.starts_with(ZIP_MAGIC) || magic.starts_with(ZIP_EMPTY_MAGIC) {
        extract_zip_entry(archive_path, entry, dest)
    } else if magic.starts_with(GZIP_MAGIC) {
        extract_tar_gz_entry(archive_path, entry, dest)
    } else {
        Err(SourceError::InvalidArgument(format!(
            "{} is not a zip or tar.gz archive",
            archive_path.display()
        )))
    }
}

fn extract_zip_entry(archive_path: &Path, entry: &str, dest: &Path) -> Result<(), SourceError> {
    let file = File::open(archive_path).map_err(SourceError::io(archive_path))?;
    let mut archive = zip::ZipArchive::new(file)?;

    let mut input = match archive.by_name(entry) {
        Ok(input) => input,
        Err(ZipError::FileNotFound) => {
            return Err(not_found_entry(archive_path, entry));
        }
        Err(e) => return Err(e.into()),
    };

    write_entry(&mut input, dest)
}

fn extract_tar_gz_entry(
    archive_path: &Path,
    entry: &str,
    dest: &Path,
) -> Result<(), SourceError> {
    let file = File::open(archive_path).map_err(SourceError::io(archive_path))?;
    let mut archive = tar::Archive::new(GzDecoder::new(file));
    let wanted = entry.trim_start_matches("./");

    for item in archive.entries().map_err(SourceError::io(archive_path))? {
        let mut item = item.map_err(SourceError::io(archive_path))?;
        let matches = item
            .path()
            .map_err(SourceError::io(archive_path))?
            .to_str()
            .is_some_and(|p| p.trim_start_matches("./") == wanted);

        if matches && item.header().entry_type().is_file() {
            return write_entry(&mut item, dest);
        }
    }

    Err(not_found_entry(archive_path, entry))
}

/// Copies an entry to `dest`, removing the partial file if reading fails.
fn write_entry(input: &mut impl io::Read, dest: &Path) -> Result<(), SourceError> {
    let mut output = File::create(dest).map_err(SourceError::io(dest))?;
    if let Err(e) = io::copy(input, &mut output) {
        drop(output);
        if let Err(cleanup) = std::fs::remove_file(dest) {
            log::warn!("Failed to remove {}: {cleanup}", dest.display());
        }
        return Err(SourceError::io(dest)(e));
    }
    Ok(())
}

fn not_found_entry(archive_path: &Path, entry: &str) -> SourceError {
    SourceError::NotFound(format!("{}!{entry}", archive_path.display()))
}
