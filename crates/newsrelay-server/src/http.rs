//! Outbound HTTP plumbing shared by the feed locator, the feed source and
//! the metadata fetcher.

use std::time::Duration;
use thiserror::Error;

/// Default timeout for every outbound request.
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(5);

/// Some publishers serve stripped-down pages (or nothing) to non-browser
/// agents, so page fetches present themselves as a desktop browser.
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/89.0.4389.82 Safari/537.36";
pub const BROWSER_ACCEPT_LANGUAGE: &str = "en-US,en;q=0.5";
pub const BROWSER_CACHE_CONTROL: &str = "max-age=0";

/// Largest HTML page read while locating feeds or extracting metadata.
pub const MAX_PAGE_BYTES: usize = 2 * 1024 * 1024;

/// Largest feed document accepted.
pub const MAX_FEED_BYTES: usize = 8 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum BodyError {
    #[error("failed to read body: {0}")]
    Read(#[from] reqwest::Error),

    #[error("body exceeds {limit} bytes")]
    TooLarge { limit: usize },
}

/// Reads a response body, giving up as soon as it grows past `limit`.
///
/// A declared `content-length` over the limit fails before any chunk is read.
pub async fn read_body_limited(
    mut resp: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, BodyError> {
    if resp.content_length().is_some_and(|len| len > limit as u64) {
        return Err(BodyError::TooLarge { limit });
    }

    let mut body = Vec::new();
    while let Some(chunk) = resp.chunk().await? {
        if body.len() + chunk.len() > limit {
            return Err(BodyError::TooLarge { limit });
        }
        body.extend_from_slice(&chunk);
    }
    Ok(body)
}

/// Builds the client used for all outbound requests.
pub fn build_http_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .redirect(reqwest::redirect::Policy::limited(10))
        .user_agent(concat!("newsrelay/", env!("CARGO_PKG_VERSION")))
        .build()
        .unwrap_or_default()
}

/// Repairs scheme separators collapsed by path normalization.
///
/// Target URLs embedded in request paths (`/og/https://example.com`) arrive
/// as `https:/example.com` once a proxy merges the slashes.
pub fn normalize_url(url: &str) -> String {
    if url.starts_with("http://") || url.starts_with("https://") {
        return url.to_string();
    }
    if let Some(rest) = url.strip_prefix("http:/") {
        return format!("http://{rest}");
    }
    if let Some(rest) = url.strip_prefix("https:/") {
        return format!("https://{rest}");
    }
    url.to_string()
}

/// Returns the `content-type` header of a response, or `""`.
pub(crate) fn content_type(headers: &reqwest::header::HeaderMap) -> &str {
    headers
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
}
