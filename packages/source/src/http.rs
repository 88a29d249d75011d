//! HTTP client configuration.
//!
//! Timeouts, the user agent and the retry budget are properties of the
//! client handed to the [`DownloadCache`](crate::DownloadCache), not of the
//! cache itself.

use std::collections::BTreeMap;
use std::time::Duration;

use crate::{SourceError, retry};

/// Settings for the HTTP client used by HTTP and `GraphQL` origins.
#[derive(Debug, Clone)]
pub struct HttpSettings {
    /// `User-Agent` header sent with every request.
    pub user_agent: String,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Retries for transient failures (timeouts, 429, 5xx).
    pub max_retries: u32,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            user_agent: concat!("aip-toolchain/", env!("CARGO_PKG_VERSION")).to_string(),
            timeout: Duration::from_secs(120),
            max_retries: retry::MAX_RETRIES,
        }
    }
}

/// A configured HTTP client.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: reqwest::Client,
    max_retries: u32,
}

impl HttpClient {
    /// Builds a client from settings.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Http`] if the TLS backend cannot be
    /// initialised.
    pub fn new(settings: &HttpSettings) -> Result<Self, SourceError> {
        let client = reqwest::Client::builder()
            .user_agent(settings.user_agent.clone())
            .timeout(settings.timeout)
            .build()?;

        Ok(Self {
            client,
            max_retries: settings.max_retries,
        })
    }

    /// Client for loopback test servers: no proxy, no retries.
    #[cfg(test)]
    pub(crate) fn local() -> Self {
        let client = reqwest::Client::builder()
            .no_proxy()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap();
        Self {
            client,
            max_retries: 0,
        }
    }

    /// Downloads `url` and returns the response body.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::NotFound`] on HTTP 404 and other
    /// [`SourceError`]s once retries are exhausted.
    pub async fn get_bytes(
        &self,
        url: &str,
        headers: &BTreeMap<String, String>,
    ) -> Result<Vec<u8>, SourceError> {
        log::debug!("GET {url}");
        retry::send_bytes(
            || apply_headers(self.client.get(url), headers),
            self.max_retries,
        )
        .await
    }

    /// Posts `body` as JSON to `url` and parses the JSON response.
    ///
    /// # Errors
    ///
    /// Same as [`HttpClient::get_bytes`], plus [`SourceError::Json`] if the
    /// response is not JSON.
    pub async fn post_json(
        &self,
        url: &str,
        body: &serde_json::Value,
        headers: &BTreeMap<String, String>,
    ) -> Result<serde_json::Value, SourceError> {
        log::debug!("POST {url}");
        retry::send_json(
            || apply_headers(self.client.post(url).json(body), headers),
            self.max_retries,
        )
        .await
    }
}

fn apply_headers(
    mut request: reqwest::RequestBuilder,
    headers: &BTreeMap<String, String>,
) -> reqwest::RequestBuilder {
    for (key, value) in headers {
        request = request.header(key.as_str(), value.as_str());
    }
    request
}
