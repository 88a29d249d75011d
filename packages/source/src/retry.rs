//! HTTP retry helpers for transient errors.
//!
//! Every HTTP origin goes through [`send_bytes`] or [`send_json`] instead of
//! calling `reqwest::RequestBuilder::send()` directly, so that timeouts,
//! connection resets, rate limiting and server errors are retried with
//! exponential backoff. HTTP 404 is mapped to [`SourceError::NotFound`] so
//! the download cache can record it as a negative result.
//!
//! ```ignore
//! let body = retry::send_bytes(|| client.get(&url), retry::MAX_RETRIES).await?;
//! let json = retry::send_json(|| client.post(&url).json(&payload), retry::MAX_RETRIES).await?;
//! ```

use std::time::Duration;

use crate::SourceError;

/// Default number of retry attempts for transient HTTP errors.
///
/// With exponential backoff (2s, 4s, 8s, 16s, 32s) the total wait before
/// giving up is 62 seconds.
pub const MAX_RETRIES: u32 = 5;

/// Maximum number of full re-fetch attempts when the response body cannot
/// be read (truncated transfer) or decoded.
const MAX_BODY_RETRIES: u32 = 2;

/// Maximum length of the response body preview included in error logs.
const BODY_PREVIEW_LEN: usize = 500;

/// Sends an HTTP request and returns the raw response body.
///
/// The `build_request` closure is called on each attempt to construct a
/// fresh [`reqwest::RequestBuilder`], since builders are consumed by
/// `.send()`.
///
/// # Errors
///
/// Returns [`SourceError::NotFound`] on HTTP 404, [`SourceError::HttpStatus`]
/// on other client errors, and [`SourceError::Http`] once retries are
/// exhausted.
#[allow(clippy::future_not_send)]
pub async fn send_bytes<F>(build_request: F, max_retries: u32) -> Result<Vec<u8>, SourceError>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    for body_attempt in 0..=MAX_BODY_RETRIES {
        let response = send_inner(&build_request, max_retries).await?;
        let url = response.url().to_string();
        let status = response.status();

        match response.bytes().await {
            Ok(bytes) => {
                log::debug!("Received {} bytes from {url}", bytes.len());
                return Ok(bytes.to_vec());
            }
            Err(e) if body_attempt < MAX_BODY_RETRIES => {
                let delay = Duration::from_secs(1u64 << (body_attempt + 1));
                log::warn!(
                    "Body read failed (body retry {}/{MAX_BODY_RETRIES}), \
                     re-fetching in {delay:?}...\n  \
                     url: {url}\n  \
                     status: {status}\n  \
                     error: {e}",
                    body_attempt + 1,
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                log::error!(
                    "Body read failed after {MAX_BODY_RETRIES} retries, giving up.\n  \
                     url: {url}\n  \
                     status: {status}\n  \
                     error: {e}",
                );
                return Err(SourceError::Http(e));
            }
        }
    }

    unreachable!("send_bytes body retry loop exited without returning")
}

/// Sends an HTTP request and parses the response body as JSON.
///
/// Behaves like [`send_bytes`], additionally re-fetching when the body is
/// not valid JSON (truncated or garbled responses).
///
/// # Errors
///
/// Same as [`send_bytes`], plus [`SourceError::Json`] if the body is still
/// not JSON after all body retries.
#[allow(clippy::future_not_send)]
pub async fn send_json<F>(
    build_request: F,
    max_retries: u32,
) -> Result<serde_json::Value, SourceError>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    for body_attempt in 0..=MAX_BODY_RETRIES {
        let bytes = send_bytes(&build_request, max_retries).await?;

        match serde_json::from_slice(&bytes) {
            Ok(value) => return Ok(value),
            Err(e) => {
                let text = String::from_utf8_lossy(&bytes);
                let preview: String = text.chars().take(BODY_PREVIEW_LEN).collect();
                if body_attempt < MAX_BODY_RETRIES {
                    let delay = Duration::from_secs(1u64 << (body_attempt + 1));
                    log::warn!(
                        "JSON parse failed (body retry {}/{MAX_BODY_RETRIES}), \
                         re-fetching in {delay:?}...\n  \
                         received: {} bytes\n  \
                         parse error: {e}\n  \
                         body preview: {preview}",
                        body_attempt + 1,
                        bytes.len(),
                    );
                    tokio::time::sleep(delay).await;
                    continue;
                }
                log::error!(
                    "JSON parse failed after {MAX_BODY_RETRIES} retries, giving up.\n  \
                     received: {} bytes\n  \
                     parse error: {e}\n  \
                     body preview: {preview}",
                    bytes.len(),
                );
                return Err(SourceError::Json(e));
            }
        }
    }

    unreachable!("send_json body retry loop exited without returning")
}

/// Core retry loop shared by [`send_bytes`] and [`send_json`].
///
/// Returns the successful [`reqwest::Response`] (status 2xx or 3xx).
#[allow(clippy::future_not_send)]
async fn send_inner<F>(build_request: &F, max_retries: u32) -> Result<reqwest::Response, SourceError>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    let mut last_error: Option<SourceError> = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            let delay = Duration::from_secs(1u64 << attempt);
            log::warn!("  retry {attempt}/{max_retries} in {delay:?}...");
            tokio::time::sleep(delay).await;
        }

        match build_request().send().await {
            Err(e) => {
                if is_transient(&e) && attempt < max_retries {
                    log::warn!("  transient error: {e}");
                    last_error = Some(SourceError::Http(e));
                    continue;
                }
                return Err(SourceError::Http(e));
            }
            Ok(response) => {
                let status = response.status();
                let url = response.url().to_string();

                if status == reqwest::StatusCode::NOT_FOUND {
                    return Err(SourceError::NotFound(url));
                }

                // 429 and 5xx are worth another attempt
                if status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
                    if attempt < max_retries {
                        log::warn!("  HTTP {status} from {url}");
                        last_error = Some(SourceError::HttpStatus {
                            url,
                            status: status.as_u16(),
                        });
                        continue;
                    }
                    return Err(SourceError::HttpStatus {
                        url,
                        status: status.as_u16(),
                    });
                }

                // Remaining 4xx are permanent
                if status.is_client_error() {
                    return Err(SourceError::HttpStatus {
                        url,
                        status: status.as_u16(),
                    });
                }

                return Ok(response);
            }
        }
    }

    Err(last_error.unwrap_or_else(|| {
        SourceError::InvalidArgument("request failed after all retries".to_string())
    }))
}

/// Returns `true` if the error is likely transient and worth retrying.
fn is_transient(e: &reqwest::Error) -> bool {
    e.is_timeout() || e.is_connect() || e.is_body() || e.is_decode() || e.is_request()
}
