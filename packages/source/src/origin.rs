//! Where a source document comes from.
//!
//! Every [`Origin`] variant knows how to materialise itself as a file
//! `<name>.<type>` inside a destination directory. The name is the
//! basename of the resource when it has one, otherwise a SHA-256 digest of
//! whatever identifies the request. The type is the explicitly declared
//! one, otherwise the extension of the resource path.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};

use crate::{HttpClient, SourceError, archive};

/// Descriptor of one fetchable source document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Origin {
    /// A file on local disk.
    LocalFile {
        /// Path of the file.
        path: PathBuf,
        /// Declared file type, overriding the extension.
        #[serde(default)]
        file_type: Option<String>,
    },
    /// An entry inside a local archive.
    LocalFileInArchive {
        /// Path of the archive.
        archive: PathBuf,
        /// Path of the entry inside the archive.
        entry: String,
        /// Declared file type, overriding the entry extension.
        #[serde(default)]
        file_type: Option<String>,
    },
    /// A resource downloaded over HTTP.
    HttpFile {
        /// Resource URL.
        url: String,
        /// Declared file type, overriding the URL extension.
        #[serde(default)]
        file_type: Option<String>,
        /// Additional HTTP headers.
        #[serde(default)]
        headers: BTreeMap<String, String>,
    },
    /// An entry inside an archive downloaded over HTTP.
    HttpFileInArchive {
        /// Archive URL.
        url: String,
        /// Path of the entry inside the archive.
        entry: String,
        /// Declared file type, overriding the entry extension.
        #[serde(default)]
        file_type: Option<String>,
        /// Additional HTTP headers.
        #[serde(default)]
        headers: BTreeMap<String, String>,
    },
    /// The JSON result of a `GraphQL` query.
    GraphQl {
        /// Endpoint URL.
        endpoint: String,
        /// Query text.
        query: String,
        /// Query variables.
        #[serde(default)]
        variables: serde_json::Value,
        /// Additional HTTP headers (e.g. API keys).
        #[serde(default)]
        headers: BTreeMap<String, String>,
    },
}

impl Origin {
    /// A local file, typed by its extension.
    #[must_use]
    pub fn local_file(path: impl Into<PathBuf>) -> Self {
        Self::LocalFile {
            path: path.into(),
            file_type: None,
        }
    }

    /// An entry of a local archive, typed by its extension.
    #[must_use]
    pub fn local_file_in_archive(archive: impl Into<PathBuf>, entry: &str) -> Self {
        Self::LocalFileInArchive {
            archive: archive.into(),
            entry: entry.to_owned(),
            file_type: None,
        }
    }

    /// An HTTP resource, typed by its URL extension.
    #[must_use]
    pub fn http_file(url: &str) -> Self {
        Self::HttpFile {
            url: url.to_owned(),
            file_type: None,
            headers: BTreeMap::new(),
        }
    }

    /// An entry of an archive downloaded over HTTP.
    #[must_use]
    pub fn http_file_in_archive(url: &str, entry: &str) -> Self {
        Self::HttpFileInArchive {
            url: url.to_owned(),
            entry: entry.to_owned(),
            file_type: None,
            headers: BTreeMap::new(),
        }
    }

    /// A `GraphQL` query.
    #[must_use]
    pub fn graphql(endpoint: &str, query: &str, variables: serde_json::Value) -> Self {
        Self::GraphQl {
            endpoint: endpoint.to_owned(),
            query: query.to_owned(),
            variables,
            headers: BTreeMap::new(),
        }
    }

    /// Declares the file type explicitly. Ignored by `GraphQL` origins,
    /// which always produce JSON.
    #[must_use]
    pub fn with_file_type(mut self, declared: &str) -> Self {
        match &mut self {
            Self::LocalFile { file_type, .. }
            | Self::LocalFileInArchive { file_type, .. }
            | Self::HttpFile { file_type, .. }
            | Self::HttpFileInArchive { file_type, .. } => {
                *file_type = Some(declared.to_owned());
            }
            Self::GraphQl { .. } => {}
        }
        self
    }

    /// Adds an HTTP header. Ignored by local origins.
    #[must_use]
    pub fn with_header(mut self, key: &str, value: &str) -> Self {
        match &mut self {
            Self::HttpFile { headers, .. }
            | Self::HttpFileInArchive { headers, .. }
            | Self::GraphQl { headers, .. } => {
                headers.insert(key.to_owned(), value.to_owned());
            }
            Self::LocalFile { .. } | Self::LocalFileInArchive { .. } => {}
        }
        self
    }

    /// Human-readable description for log messages.
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::LocalFile { path, .. } => path.display().to_string(),
            Self::LocalFileInArchive { archive, entry, .. } => {
                format!("{}!{entry}", archive.display())
            }
            Self::HttpFile { url, .. } => url.clone(),
            Self::HttpFileInArchive { url, entry, .. } => format!("{url}!{entry}"),
            Self::GraphQl { endpoint, .. } => format!("graphql:{endpoint}"),
        }
    }

    /// The path whose basename and extension identify the resource.
    fn resource_path(&self) -> Option<String> {
        match self {
            Self::LocalFile { path, .. } => Some(path.to_string_lossy().into_owned()),
            Self::LocalFileInArchive { entry, .. } | Self::HttpFileInArchive { entry, .. } => {
                Some(entry.clone())
            }
            Self::HttpFile { url, .. } => reqwest::Url::parse(url)
                .ok()
                .map(|u| u.path().to_owned())
                .filter(|p| !p.is_empty() && p != "/"),
            Self::GraphQl { .. } => None,
        }
    }

    /// File type of the fetched document.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::MissingType`] if no type was declared and the
    /// resource path has no extension.
    pub fn file_type(&self) -> Result<String, SourceError> {
        let declared = match self {
            Self::LocalFile { file_type, .. }
            | Self::LocalFileInArchive { file_type, .. }
            | Self::HttpFile { file_type, .. }
            | Self::HttpFileInArchive { file_type, .. } => file_type.clone(),
            Self::GraphQl { .. } => Some("json".to_string()),
        };

        declared
            .or_else(|| {
                let path = self.resource_path()?;
                Path::new(&path)
                    .extension()
                    .and_then(|e| e.to_str())
                    .map(str::to_ascii_lowercase)
            })
            .ok_or_else(|| SourceError::MissingType(self.describe()))
    }

    /// Cache-safe name of the fetched document (without extension).
    #[must_use]
    pub fn name(&self) -> String {
        self.resource_path()
            .and_then(|path| {
                Path::new(&path)
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .map(str::to_owned)
            })
            .filter(|stem| !stem.is_empty() && !stem.starts_with('.'))
            .unwrap_or_else(|| self.digest())
    }

    /// SHA-256 over everything that identifies the request.
    #[must_use]
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        match self {
            Self::GraphQl {
                endpoint,
                query,
                variables,
                ..
            } => {
                hasher.update(endpoint.as_bytes());
                hasher.update(b"\n");
                hasher.update(query.as_bytes());
                hasher.update(b"\n");
                hasher.update(variables.to_string().as_bytes());
            }
            other => hasher.update(other.describe().as_bytes()),
        }
        hex::encode(hasher.finalize())
    }

    /// Materialises the document inside `dir` and returns the path of the
    /// fetched file (`<name>.<type>`).
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::NotFound`] if the source file, archive,
    /// archive entry or HTTP resource does not exist. Other failures are
    /// returned as-is.
    pub async fn fetch_to(&self, dir: &Path, http: &HttpClient) -> Result<PathBuf, SourceError> {
        let fetched = dir.join(format!("{}.{}", self.name(), self.file_type()?));
        log::info!("Fetching {}", self.describe());

        match self {
            Self::LocalFile { path, .. } => {
                if !path.is_file() {
                    return Err(SourceError::NotFound(path.display().to_string()));
                }
                tokio::fs::copy(path, &fetched)
                    .await
                    .map_err(SourceError::io(path))?;
            }
            Self::LocalFileInArchive { archive, entry, .. } => {
                if !archive.is_file() {
                    return Err(SourceError::NotFound(archive.display().to_string()));
                }
                archive::extract_entry(archive, entry, &fetched)?;
            }
            Self::HttpFile { url, headers, .. } => {
                let body = http.get_bytes(url, headers).await?;
                tokio::fs::write(&fetched, body)
                    .await
                    .map_err(SourceError::io(&fetched))?;
            }
            Self::HttpFileInArchive {
                url, entry, headers, ..
            } => {
                let body = http.get_bytes(url, headers).await?;
                // Dot-prefixed so a leftover never ends up in the archive.
                let download = dir.join(format!(".{}", hex::encode(Sha256::digest(url))));
                tokio::fs::write(&download, body)
                    .await
                    .map_err(SourceError::io(&download))?;
                let extracted = archive::extract_entry(&download, entry, &fetched);
                tokio::fs::remove_file(&download)
                    .await
                    .map_err(SourceError::io(&download))?;
                extracted?;
            }
            Self::GraphQl {
                endpoint,
                query,
                variables,
                headers,
            } => {
                let body = serde_json::json!({ "query": query, "variables": variables });
                let response = http.post_json(endpoint, &body, headers).await?;

                if let Some(errors) = response.get("errors").and_then(|e| e.as_array())
                    && !errors.is_empty()
                {
                    let message = errors
                        .iter()
                        .map(|e| {
                            e.get("message")
                                .and_then(|m| m.as_str())
                                .map_or_else(|| e.to_string(), str::to_owned)
                        })
                        .collect::<Vec<_>>()
                        .join("; ");
                    return Err(SourceError::GraphQl {
                        endpoint: endpoint.clone(),
                        message,
                    });
                }

                tokio::fs::write(&fetched, serde_json::to_vec_pretty(&response)?)
                    .await
                    .map_err(SourceError::io(&fetched))?;
            }
        }

        Ok(fetched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_server::TestServer;
    use std::fs;
    use std::io::Write as _;

    fn scratch(name: &str) -> PathBuf {
        let tmp = std::env::temp_dir().join(format!("aip_source_origin_{name}"));
        let _ = fs::remove_dir_all(&tmp);
        fs::create_dir_all(&tmp).unwrap();
        tmp
    }

    fn zip_bytes(entries: &[(&str, &str)]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
        for (name, body) in entries {
            writer
                .start_file(*name, zip::write::SimpleFileOptions::default())
                .unwrap();
            writer.write_all(body.as_bytes()).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    fn dir_entries(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn http_404_is_not_found() {
        let tmp = scratch("http_404");
        let server = TestServer::start(vec![]).await;
        let origin = Origin::http_file(&server.url("/eaip/ENR-2.1.html"));

        let error = origin.fetch_to(&tmp, &HttpClient::local()).await.unwrap_err();
        assert!(error.is_not_found());
        assert!(dir_entries(&tmp).is_empty());

        let _ = fs::remove_dir_all(&tmp);
    }

    #[tokio::test]
    async fn http_file_is_written_as_served() {
        let tmp = scratch("http_file");
        let server =
            TestServer::start(vec![("/eaip/ENR-2.1.html", 200, b"<p>ENR</p>".to_vec())]).await;
        let origin = Origin::http_file(&server.url("/eaip/ENR-2.1.html"));

        let fetched = origin.fetch_to(&tmp, &HttpClient::local()).await.unwrap();
        assert_eq!(fetched, tmp.join("ENR-2.1.html"));
        assert_eq!(fs::read_to_string(&fetched).unwrap(), "<p>ENR</p>");

        let _ = fs::remove_dir_all(&tmp);
    }

    #[tokio::test]
    async fn http_archive_entry_is_extracted_and_download_removed() {
        let tmp = scratch("http_archive");
        let body = zip_bytes(&[("data/AIP.xml", "<AIP/>"), ("data/other.txt", "x")]);
        let server = TestServer::start(vec![("/dump.zip", 200, body)]).await;
        let http = HttpClient::local();

        let origin = Origin::http_file_in_archive(&server.url("/dump.zip"), "data/AIP.xml");
        let fetched = origin.fetch_to(&tmp, &http).await.unwrap();
        assert_eq!(fs::read_to_string(&fetched).unwrap(), "<AIP/>");
        assert_eq!(dir_entries(&tmp), ["AIP.xml"]);

        let missing = Origin::http_file_in_archive(&server.url("/dump.zip"), "data/ENR.xml");
        assert!(missing.fetch_to(&tmp, &http).await.unwrap_err().is_not_found());
        assert_eq!(dir_entries(&tmp), ["AIP.xml"]);

        let _ = fs::remove_dir_all(&tmp);
    }

    #[tokio::test]
    async fn graphql_errors_are_rejected() {
        let tmp = scratch("graphql");
        let server = TestServer::start(vec![
            (
                "/bad",
                200,
                br#"{"data":null,"errors":[{"message":"unknown field"},{"message":"bad region"}]}"#
                    .to_vec(),
            ),
            ("/good", 200, br#"{"data":{"airports":[{"id":"LFSB"}]}}"#.to_vec()),
        ])
        .await;
        let http = HttpClient::local();
        let query = "query { airports { id } }";

        let bad = Origin::graphql(&server.url("/bad"), query, serde_json::json!({}));
        match bad.fetch_to(&tmp, &http).await {
            Err(SourceError::GraphQl { message, .. }) => {
                assert_eq!(message, "unknown field; bad region");
            }
            other => panic!("expected a GraphQL error, got {other:?}"),
        }
        assert!(dir_entries(&tmp).is_empty());

        let good = Origin::graphql(&server.url("/good"), query, serde_json::json!({}));
        let fetched = good.fetch_to(&tmp, &http).await.unwrap();
        let value: serde_json::Value =
            serde_json::from_slice(&fs::read(&fetched).unwrap()).unwrap();
        assert_eq!(value["data"]["airports"][0]["id"], "LFSB");

        let _ = fs::remove_dir_all(&tmp);
    }

    #[tokio::test]
    async fn local_archive_entry_is_extracted() {
        let tmp = scratch("local_archive");
        let archive = tmp.join("dump.zip");
        fs::write(&archive, zip_bytes(&[("AD/LFSB.csv", "ident\nLFSB\n")])).unwrap();
        let out = tmp.join("out");
        fs::create_dir_all(&out).unwrap();
        let http = HttpClient::local();

        let origin = Origin::local_file_in_archive(&archive, "AD/LFSB.csv");
        let fetched = origin.fetch_to(&out, &http).await.unwrap();
        assert_eq!(fetched, out.join("LFSB.csv"));
        assert_eq!(fs::read_to_string(&fetched).unwrap(), "ident\nLFSB\n");

        let missing = Origin::local_file_in_archive(&archive, "AD/LFST.csv");
        assert!(missing.fetch_to(&out, &http).await.unwrap_err().is_not_found());
        let no_archive = Origin::local_file_in_archive(tmp.join("gone.zip"), "AD/LFSB.csv");
        assert!(no_archive.fetch_to(&out, &http).await.unwrap_err().is_not_found());
        assert_eq!(dir_entries(&out), ["LFSB.csv"]);

        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn derives_name_and_type_from_path() {
        let origin = Origin::local_file("/data/aip/ENR-2.1.html");
        assert_eq!(origin.name(), "ENR-2.1");
        assert_eq!(origin.file_type().unwrap(), "html");
    }

    #[test]
    fn declared_type_wins_over_extension() {
        let origin = Origin::local_file("/data/dump.dat").with_file_type("xml");
        assert_eq!(origin.file_type().unwrap(), "xml");
    }

    #[test]
    fn missing_type_is_an_error() {
        let origin = Origin::http_file("https://example.com/aip/");
        assert!(matches!(
            origin.file_type(),
            Err(SourceError::MissingType(_))
        ));
    }

    #[test]
    fn url_name_ignores_query_string() {
        let origin = Origin::http_file("https://example.com/eaip/AD-2.LFSB.pdf?v=3");
        assert_eq!(origin.name(), "AD-2.LFSB");
        assert_eq!(origin.file_type().unwrap(), "pdf");
    }

    #[test]
    fn url_without_path_falls_back_to_digest() {
        let origin = Origin::http_file("https://example.com").with_file_type("html");
        assert_eq!(origin.name(), origin.digest());
        assert_eq!(origin.name().len(), 64);
    }

    #[test]
    fn archive_entry_names_the_document() {
        let origin = Origin::http_file_in_archive("https://example.com/dump.zip", "data/AIP.xml");
        assert_eq!(origin.name(), "AIP");
        assert_eq!(origin.file_type().unwrap(), "xml");
    }

    #[test]
    fn graphql_is_named_by_digest_of_request() {
        let a = Origin::graphql(
            "https://api.example.com/graphql",
            "query { airports { id } }",
            serde_json::json!({"region": "LF"}),
        );
        let b = Origin::graphql(
            "https://api.example.com/graphql",
            "query { airports { id } }",
            serde_json::json!({"region": "LS"}),
        );
        assert_eq!(a.file_type().unwrap(), "json");
        assert_eq!(a.name(), a.digest());
        assert_ne!(a.name(), b.name());
    }

    #[test]
    fn deserializes_tagged_variants() {
        let origin: Origin = serde_json::from_value(serde_json::json!({
            "type": "http_file",
            "url": "https://example.com/ENR.html",
            "headers": {"Accept": "text/html"}
        }))
        .unwrap();
        assert!(matches!(origin, Origin::HttpFile { .. }));
    }
}
