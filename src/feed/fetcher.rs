use futures::stream::StreamExt;
use reqwest::header::IF_MODIFIED_SINCE;
use reqwest::StatusCode;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use thiserror::Error;

const FETCH_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_FEED_SIZE: usize = 10 * 1024 * 1024; // 10MB

/// Errors that can occur while retrieving a feed document over HTTP.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// Neither 200 nor 304
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// Request exceeded the 30-second timeout
    #[error("Request timed out")]
    Timeout,
    /// Response body exceeded the 10MB size limit
    #[error("Response too large")]
    ResponseTooLarge,
    /// Response was incomplete (received fewer bytes than Content-Length)
    #[error("Incomplete response: expected {expected} bytes, received {received}")]
    IncompleteResponse { expected: u64, received: usize },
    /// The server answered 304 but the cached copy could not be read
    #[error("Cache error: {0}")]
    Cache(#[from] std::io::Error),
}

/// A retrieved feed document and where it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fetched {
    /// Downloaded now (200).
    Fresh(Vec<u8>),
    /// Unchanged since the last download (304); read from the cache.
    Cached(Vec<u8>),
}

impl Fetched {
    pub fn bytes(&self) -> &[u8] {
        match self {
            Fetched::Fresh(b) | Fetched::Cached(b) => b,
        }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            Fetched::Fresh(b) | Fetched::Cached(b) => b,
        }
    }
}

/// Fetches `url`, reusing the copy cached in `cache_dir` when the server
/// reports it unchanged.
///
/// The request carries `If-Modified-Since` set to the cache file's
/// modification time when a cached copy exists. A 200 response replaces the
/// cached copy; a 304 response returns it. The URL is not validated here;
/// callers that take URLs from users run [`crate::util::validate_url`] first.
///
/// # Errors
///
/// - [`FetchError::HttpStatus`] for any status other than 200 or 304
/// - [`FetchError::Cache`] for a 304 with no readable cached copy
/// - [`FetchError::Timeout`], [`FetchError::Network`],
///   [`FetchError::ResponseTooLarge`] for transport failures
///
/// Failing to write the cache is logged and does not fail the fetch.
pub async fn fetch_cached(
    client: &reqwest::Client,
    url: &str,
    cache_dir: &Path,
) -> Result<Fetched, FetchError> {
    let cache_path = cache_path(cache_dir, url);

    let mut request = client.get(url);
    if let Some(since) = cached_since(&cache_path).await {
        tracing::debug!(url = %url, since = %since, "Sending conditional request");
        request = request.header(IF_MODIFIED_SINCE, since);
    }

    let response = tokio::time::timeout(FETCH_TIMEOUT, request.send())
        .await
        .map_err(|_| FetchError::Timeout)?
        .map_err(FetchError::Network)?;

    match response.status() {
        StatusCode::NOT_MODIFIED => {
            tracing::debug!(url = %url, path = %cache_path.display(), "Feed unchanged, using cache");
            let bytes = tokio::fs::read(&cache_path).await?;
            Ok(Fetched::Cached(bytes))
        }
        StatusCode::OK => {
            let bytes = read_limited_bytes(response, MAX_FEED_SIZE).await?;
            if let Err(e) = store(cache_dir, &cache_path, &bytes).await {
                tracing::warn!(
                    path = %cache_path.display(),
                    error = %e,
                    "Failed to update feed cache"
                );
            }
            Ok(Fetched::Fresh(bytes))
        }
        status => Err(FetchError::HttpStatus(status.as_u16())),
    }
}

/// Cache file for `url`: the hex SHA-256 of the URL inside `cache_dir`.
pub(crate) fn cache_path(cache_dir: &Path, url: &str) -> PathBuf {
    let digest = Sha256::digest(url.as_bytes());
    cache_dir.join(format!("{:x}", digest))
}

/// Modification time of the cached copy as an HTTP date.
async fn cached_since(path: &Path) -> Option<String> {
    let modified = tokio::fs::metadata(path).await.ok()?.modified().ok()?;
    Some(http_date(modified))
}

fn http_date(time: SystemTime) -> String {
    chrono::DateTime::<chrono::Utc>::from(time)
        .format("%a, %d %b %Y %H:%M:%S GMT")
        .to_string()
}

/// Writes to a sibling temp file and renames it into place.
async fn store(cache_dir: &Path, path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    tokio::fs::create_dir_all(cache_dir).await?;
    let tmp = path.with_extension("tmp");
    tokio::fs::write(&tmp, bytes).await?;
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e);
    }
    Ok(())
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    let expected_length = response.content_length();

    // Fast path: check Content-Length header
    if let Some(len) = expected_length {
        if len as usize > limit {
            return Err(FetchError::ResponseTooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(FetchError::Network)?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FetchError::ResponseTooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    if let Some(expected) = expected_length {
        if (bytes.len() as u64) < expected {
            return Err(FetchError::IncompleteResponse {
                expected,
                received: bytes.len(),
            });
        }
    }

    Ok(bytes)
}
