//! Archive-backed download cache.
//!
//! A [`DownloadCache`] session is scoped to a storage root and a source
//! identifier (usually the AIRAC date). Layout below the storage root:
//!
//! ```text
//! <storage>/work/                  scratch directory, one file per document
//! <storage>/sources/<source>.zip   documents persisted across runs
//! ```
//!
//! Opening a session recreates the scratch directory and unpacks the
//! archive into it. Closing (explicitly or on drop) writes the scratch
//! directory back into the archive unless the session is clean, then
//! removes the scratch directory. A zero-length `<document>.<type>` file is
//! the cached "not found" result and replays as [`SourceError::NotFound`].
//!
//! Repacking renames the previous archive to `<source>.zip.old` first and
//! deletes it afterwards. This is not atomic across a crash; a leftover
//! `.old` archive has to be recovered by hand, and later sessions never
//! delete or overwrite it.

use std::path::{Path, PathBuf};

use crate::decode::{self, ParsedDocument};
use crate::{HttpClient, Origin, SourceError, archive};

const WORK_DIR: &str = "work";
const SOURCES_DIR: &str = "sources";
const STAGING_DIR: &str = ".fetch";

/// A download cache session.
#[derive(Debug)]
pub struct DownloadCache {
    work_dir: PathBuf,
    archive: PathBuf,
    clean: bool,
    http: HttpClient,
    fetches: usize,
    finished: bool,
}

impl DownloadCache {
    /// Opens a session for `source` below `storage`.
    ///
    /// With `clean` set, the session starts from the saved archive as usual
    /// but nothing is written back when it ends.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::InvalidArgument`] if `storage` is not an
    /// existing directory or `source` is not a plain name, and
    /// [`SourceError::Io`]/[`SourceError::Zip`] if the scratch directory
    /// cannot be prepared. The scratch directory is removed again on
    /// failure.
    pub fn open(
        storage: &Path,
        source: &str,
        clean: bool,
        http: HttpClient,
    ) -> Result<Self, SourceError> {
        if !storage.is_dir() {
            return Err(SourceError::InvalidArgument(format!(
                "storage directory {} does not exist",
                storage.display()
            )));
        }
        check_plain_name("source", source)?;

        let work_dir = storage.join(WORK_DIR);
        let archive = storage.join(SOURCES_DIR).join(format!("{source}.zip"));

        let backup = backup_path(&archive);
        if backup.exists() {
            log::warn!(
                "Found backup {} from an interrupted session, recover it by hand",
                backup.display()
            );
        }

        if work_dir.exists() {
            std::fs::remove_dir_all(&work_dir).map_err(SourceError::io(&work_dir))?;
        }
        std::fs::create_dir_all(&work_dir).map_err(SourceError::io(&work_dir))?;

        if archive.is_file() {
            if let Err(e) = archive::unpack(&archive, &work_dir) {
                if let Err(cleanup) = std::fs::remove_dir_all(&work_dir) {
                    log::warn!("Failed to remove {}: {cleanup}", work_dir.display());
                }
                return Err(e);
            }
            log::info!("Opened download cache {}", archive.display());
        } else {
            log::info!("Opened empty download cache for {source}");
        }

        Ok(Self {
            work_dir,
            archive,
            clean,
            http,
            fetches: 0,
            finished: false,
        })
    }

    /// Scratch directory of this session.
    #[must_use]
    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// Archive this session persists to.
    #[must_use]
    pub fn archive_path(&self) -> &Path {
        &self.archive
    }

    /// Whether the session discards its work on close.
    #[must_use]
    pub const fn is_clean(&self) -> bool {
        self.clean
    }

    /// Number of origin fetches performed by this session.
    #[must_use]
    pub const fn fetch_count(&self) -> usize {
        self.fetches
    }

    /// Returns `document` decoded according to its type, fetching it from
    /// `origin` unless it is already cached.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::NotFound`] if the document does not exist
    /// upstream (now or in an earlier run of this source), the origin's
    /// error for any other fetch failure, and [`SourceError::Decode`] if
    /// the content does not match its type.
    pub async fn read(
        &mut self,
        document: &str,
        origin: &Origin,
    ) -> Result<ParsedDocument, SourceError> {
        let path = self.read_raw(document, origin).await?;
        let file_type = origin.file_type()?;
        decode::decode(&path, &file_type)
    }

    /// Like [`DownloadCache::read`] but returns the path of the cached file
    /// instead of decoding it.
    ///
    /// # Errors
    ///
    /// Same as [`DownloadCache::read`], minus decoding errors.
    pub async fn read_raw(
        &mut self,
        document: &str,
        origin: &Origin,
    ) -> Result<PathBuf, SourceError> {
        check_plain_name("document", document)?;
        let cached = self
            .work_dir
            .join(format!("{document}.{}", origin.file_type()?));

        if let Ok(metadata) = tokio::fs::metadata(&cached).await {
            if metadata.len() == 0 {
                log::debug!("Replaying not found for {document}");
                return Err(SourceError::NotFound(origin.describe()));
            }
            log::debug!("Using cached {}", cached.display());
            return Ok(cached);
        }

        let staging = self.work_dir.join(STAGING_DIR);
        tokio::fs::create_dir_all(&staging)
            .await
            .map_err(SourceError::io(&staging))?;

        self.fetches += 1;
        let fetched = origin.fetch_to(&staging, &self.http).await;

        let result = match fetched {
            Ok(fetched) => tokio::fs::rename(&fetched, &cached)
                .await
                .map_err(SourceError::io(&cached))
                .map(|()| cached),
            Err(e) if e.is_not_found() => {
                log::warn!("{document} not found upstream: {e}");
                match tokio::fs::write(&cached, b"").await {
                    Ok(()) => Err(e),
                    Err(io) => Err(SourceError::io(&cached)(io)),
                }
            }
            Err(e) => Err(e),
        };

        if let Err(e) = tokio::fs::remove_dir_all(&staging).await {
            log::warn!("Failed to remove {}: {e}", staging.display());
        }

        result
    }

    /// Ends the session, persisting the scratch directory unless clean.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Io`]/[`SourceError::Zip`] if the archive
    /// cannot be written. The scratch directory is removed in any case.
    pub fn close(mut self) -> Result<(), SourceError> {
        self.finish()
    }

    fn finish(&mut self) -> Result<(), SourceError> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;

        let repacked = if self.clean {
            log::debug!("Clean session, discarding {}", self.work_dir.display());
            Ok(())
        } else {
            self.repack()
        };

        let removed =
            std::fs::remove_dir_all(&self.work_dir).map_err(SourceError::io(&self.work_dir));

        repacked.and(removed)
    }

    fn repack(&self) -> Result<(), SourceError> {
        if let Some(parent) = self.archive.parent() {
            std::fs::create_dir_all(parent).map_err(SourceError::io(parent))?;
        }

        // A backup this session did not create is left for manual recovery.
        let rotated = backup_path(&self.archive);
        let rotate = self.archive.exists() && !rotated.exists();
        if rotate {
            std::fs::rename(&self.archive, &rotated).map_err(SourceError::io(&rotated))?;
        } else if rotated.exists() {
            log::warn!(
                "Keeping stale backup {}, overwriting {} without rotation",
                rotated.display(),
                self.archive.display()
            );
        }

        let count = archive::pack(&self.work_dir, &self.archive)?;

        if rotate {
            std::fs::remove_file(&rotated).map_err(SourceError::io(&rotated))?;
        }

        log::info!(
            "Saved {count} documents to {}",
            self.archive.display()
        );

        Ok(())
    }
}

impl Drop for DownloadCache {
    fn drop(&mut self) {
        if let Err(e) = self.finish() {
            log::error!("Failed to close download cache {}: {e}", self.archive.display());
        }
    }
}

fn backup_path(archive: &Path) -> PathBuf {
    archive.with_extension("zip.old")
}

fn check_plain_name(what: &str, name: &str) -> Result<(), SourceError> {
    let plain = !name.is_empty()
        && !name.starts_with('.')
        && !name.contains(['/', '\\'])
        && name != "..";
    if plain {
        Ok(())
    } else {
        Err(SourceError::InvalidArgument(format!(
            "{what} name {name:?} must be a plain file name"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::HttpSettings;
    use crate::test_server::TestServer;
    use std::fs;

    fn scratch(name: &str) -> PathBuf {
        let tmp = std::env::temp_dir().join(format!("aip_source_cache_{name}"));
        let _ = fs::remove_dir_all(&tmp);
        fs::create_dir_all(tmp.join("storage")).unwrap();
        fs::create_dir_all(tmp.join("upstream")).unwrap();
        tmp
    }

    fn http() -> HttpClient {
        HttpClient::new(&HttpSettings::default()).unwrap()
    }

    fn archive_entries(path: &Path) -> Vec<String> {
        let archive = zip::ZipArchive::new(fs::File::open(path).unwrap()).unwrap();
        let mut names: Vec<String> = archive.file_names().map(str::to_owned).collect();
        names.sort();
        names
    }

    #[test]
    fn open_requires_existing_storage() {
        let missing = std::env::temp_dir().join("aip_source_cache_missing_storage");
        let _ = fs::remove_dir_all(&missing);
        let result = DownloadCache::open(&missing, "2024-01-25", false, http());
        assert!(matches!(result, Err(SourceError::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn read_is_idempotent_within_a_session() {
        let tmp = scratch("idempotent");
        let upstream = tmp.join("upstream/ENR-2.1.html");
        fs::write(&upstream, "<p>ENR</p>").unwrap();
        let origin = Origin::local_file(&upstream);

        let mut cache = DownloadCache::open(&tmp.join("storage"), "src", true, http()).unwrap();
        let first = cache.read_raw("enr", &origin).await.unwrap();
        fs::remove_file(&upstream).unwrap();
        let second = cache.read_raw("enr", &origin).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(fs::read_to_string(&second).unwrap(), "<p>ENR</p>");
        assert_eq!(cache.fetch_count(), 1);

        let document = cache.read("enr", &origin).await.unwrap();
        assert!(document.as_html().is_some());
        assert_eq!(cache.fetch_count(), 1);

        cache.close().unwrap();
        let _ = fs::remove_dir_all(&tmp);
    }

    #[tokio::test]
    async fn not_found_is_replayed_without_fetching() {
        let tmp = scratch("negative");
        let storage = tmp.join("storage");
        let origin = Origin::local_file(tmp.join("upstream/missing.pdf"));

        let mut cache = DownloadCache::open(&storage, "src", false, http()).unwrap();
        let first = cache.read("missing", &origin).await.unwrap_err();
        assert!(first.is_not_found());
        let second = cache.read("missing", &origin).await.unwrap_err();
        assert!(second.is_not_found());
        assert_eq!(cache.fetch_count(), 1);
        cache.close().unwrap();

        // The sentinel survives the archive round trip.
        let mut cache = DownloadCache::open(&storage, "src", false, http()).unwrap();
        assert!(cache.read("missing", &origin).await.unwrap_err().is_not_found());
        assert_eq!(cache.fetch_count(), 0);
        cache.close().unwrap();

        let _ = fs::remove_dir_all(&tmp);
    }

    #[tokio::test]
    async fn http_404_is_cached_as_sentinel() {
        let tmp = scratch("http_404");
        let server = TestServer::start(vec![]).await;
        let origin = Origin::http_file(&server.url("/eaip/missing.html"));

        let mut cache =
            DownloadCache::open(&tmp.join("storage"), "src", false, HttpClient::local()).unwrap();
        assert!(cache.read("missing", &origin).await.unwrap_err().is_not_found());
        assert!(cache.read("missing", &origin).await.unwrap_err().is_not_found());
        assert_eq!(cache.fetch_count(), 1);
        assert_eq!(server.hits(), 1);

        let sentinel = cache.work_dir().join("missing.html");
        assert_eq!(fs::metadata(&sentinel).unwrap().len(), 0);

        let archive = cache.archive_path().to_path_buf();
        cache.close().unwrap();
        assert_eq!(archive_entries(&archive), ["missing.html"]);

        let _ = fs::remove_dir_all(&tmp);
    }

    #[tokio::test]
    async fn other_failures_are_not_cached() {
        let tmp = scratch("no_type");
        let origin = Origin::local_file(tmp.join("upstream/README"));

        let mut cache = DownloadCache::open(&tmp.join("storage"), "src", false, http()).unwrap();
        let result = cache.read("readme", &origin).await;
        assert!(matches!(result, Err(SourceError::MissingType(_))));
        assert_eq!(fs::read_dir(cache.work_dir()).unwrap().count(), 0);

        drop(cache);
        let _ = fs::remove_dir_all(&tmp);
    }

    #[tokio::test]
    async fn rejects_document_names_with_separators() {
        let tmp = scratch("bad_name");
        let upstream = tmp.join("upstream/a.txt");
        fs::write(&upstream, "a").unwrap();

        let mut cache = DownloadCache::open(&tmp.join("storage"), "src", true, http()).unwrap();
        for name in ["../escape", ".hidden", ""] {
            let result = cache.read_raw(name, &Origin::local_file(&upstream)).await;
            assert!(matches!(result, Err(SourceError::InvalidArgument(_))));
        }

        drop(cache);
        let _ = fs::remove_dir_all(&tmp);
    }

    #[tokio::test]
    async fn session_adds_new_documents_to_the_archive() {
        let tmp = scratch("end_to_end");
        let storage = tmp.join("storage");

        let mut cache = DownloadCache::open(&storage, "2024-01-25", false, http()).unwrap();
        fs::write(cache.work_dir().join("one.html"), "<p>1</p>").unwrap();
        fs::write(cache.work_dir().join("two.html"), "<p>2</p>").unwrap();
        cache.close().unwrap();

        let archive = storage.join("sources/2024-01-25.zip");
        assert_eq!(archive_entries(&archive), ["one.html", "two.html"]);

        let upstream = tmp.join("upstream/three.html");
        fs::write(&upstream, "<p>3</p>").unwrap();

        let mut cache = DownloadCache::open(&storage, "2024-01-25", false, http()).unwrap();
        assert_eq!(
            fs::read_to_string(cache.work_dir().join("one.html")).unwrap(),
            "<p>1</p>"
        );
        cache
            .read("three", &Origin::local_file(&upstream))
            .await
            .unwrap();
        cache.close().unwrap();

        assert_eq!(
            archive_entries(&archive),
            ["one.html", "three.html", "two.html"]
        );
        assert!(!storage.join("sources/2024-01-25.zip.old").exists());
        assert!(!storage.join("work").exists());

        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn stale_backup_survives_repack() {
        let tmp = scratch("stale_backup");
        let storage = tmp.join("storage");
        let sources = storage.join("sources");
        fs::create_dir_all(&sources).unwrap();
        fs::write(sources.join("src.zip.old"), "backup").unwrap();

        // No archive, only the backup of an interrupted session.
        let cache = DownloadCache::open(&storage, "src", false, http()).unwrap();
        fs::write(cache.work_dir().join("one.html"), "<p>1</p>").unwrap();
        cache.close().unwrap();

        assert_eq!(fs::read_to_string(sources.join("src.zip.old")).unwrap(), "backup");
        assert_eq!(archive_entries(&sources.join("src.zip")), ["one.html"]);

        // An existing archive is not rotated over the backup either.
        let cache = DownloadCache::open(&storage, "src", false, http()).unwrap();
        fs::write(cache.work_dir().join("two.html"), "<p>2</p>").unwrap();
        cache.close().unwrap();

        assert_eq!(fs::read_to_string(sources.join("src.zip.old")).unwrap(), "backup");
        assert_eq!(
            archive_entries(&sources.join("src.zip")),
            ["one.html", "two.html"]
        );

        let _ = fs::remove_dir_all(&tmp);
    }

    #[tokio::test]
    async fn clean_session_leaves_archive_untouched() {
        let tmp = scratch("clean");
        let storage = tmp.join("storage");

        let cache = DownloadCache::open(&storage, "src", false, http()).unwrap();
        fs::write(cache.work_dir().join("kept.txt"), "kept").unwrap();
        cache.close().unwrap();

        let upstream = tmp.join("upstream/new.txt");
        fs::write(&upstream, "new").unwrap();
        let mut cache = DownloadCache::open(&storage, "src", true, http()).unwrap();
        cache
            .read("new", &Origin::local_file(&upstream))
            .await
            .unwrap();
        drop(cache);

        assert_eq!(
            archive_entries(&storage.join("sources/src.zip")),
            ["kept.txt"]
        );
        assert!(!storage.join("work").exists());

        let _ = fs::remove_dir_all(&tmp);
    }
}
