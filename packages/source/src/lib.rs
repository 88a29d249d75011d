#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Source document retrieval.
//!
//! An [`Origin`] describes where one source document comes from (a local
//! file, an entry of a local or remote archive, an HTTP resource or a
//! `GraphQL` query). The [`DownloadCache`] materialises documents from
//! their origins into a scratch directory that is persisted as a zip
//! archive per source identifier, so that re-running a conversion replays
//! previously fetched documents (including confirmed "not found" results)
//! without touching the network.

pub mod archive;
pub mod cache;
pub mod decode;
pub mod http;
pub mod origin;
pub mod retry;

#[cfg(test)]
mod test_server;

pub use cache::DownloadCache;
pub use decode::{ParsedDocument, Sheet, XmlElement};
pub use http::{HttpClient, HttpSettings};
pub use origin::Origin;

/// Errors that can occur while fetching, caching or decoding documents.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// The document does not exist upstream (HTTP 404, missing file or
    /// archive entry). Cached as a negative result.
    #[error("Not found: {0}")]
    NotFound(String),

    /// No file type was declared and none could be derived.
    #[error("Cannot derive file type for {0}, declare it explicitly")]
    MissingType(String),

    /// Malformed argument (missing storage directory, bad document name).
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success HTTP status other than 404.
    #[error("HTTP {status} for {url}")]
    HttpStatus {
        /// Request URL.
        url: String,
        /// HTTP status code.
        status: u16,
    },

    /// The `GraphQL` endpoint answered with errors.
    #[error("GraphQL error from {endpoint}: {message}")]
    GraphQl {
        /// Endpoint URL.
        endpoint: String,
        /// Error messages reported by the endpoint.
        message: String,
    },

    /// JSON encoding or decoding failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Reading or writing a zip archive failed.
    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// I/O error at a known path.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path that caused the error.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A fetched file could not be decoded according to its type.
    #[error("Cannot decode {path}: {message}")]
    Decode {
        /// File that failed to decode.
        path: String,
        /// Description of what went wrong.
        message: String,
    },
}

impl SourceError {
    /// Whether this is a (possibly replayed) upstream "not found".
    ///
    /// Callers reading optional documents use this to skip rather than
    /// abort.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Builds a closure mapping an I/O error at `path` to [`SourceError::Io`].
    pub(crate) fn io(path: &std::path::Path) -> impl FnOnce(std::io::Error) -> Self + '_ {
        move |source| Self::Io {
            path: path.display().to_string(),
            source,
        }
    }
}
