use std::path::Path;

use async_trait::async_trait;
use serde::de::DeserializeOwned;

use crate::core::error::{InstallerError, InstallerResult};

/// Result of a conditional download.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadOutcome {
    Downloaded,
    /// The server answered 304 for the file already at the destination.
    UpToDate,
}

/// HTTP capability used by every component that talks to the network.
///
/// Implementations own transport concerns (pooling, TLS, redirects, retry of
/// transient failures). Callers only see the final outcome.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// GET `url` and return the full response body.
    async fn get_bytes(&self, url: &str, headers: &[(&str, &str)]) -> InstallerResult<Vec<u8>>;

    /// GET `url` into `dest`, creating parent directories as needed.
    ///
    /// When `dest` already exists the request is conditional on its
    /// modification time and a 304 leaves the file untouched.
    async fn download_file(
        &self,
        url: &str,
        dest: &Path,
        headers: &[(&str, &str)],
    ) -> InstallerResult<DownloadOutcome>;
}

/// GET `url` and deserialize the body as JSON.
pub async fn fetch_json<T: DeserializeOwned>(
    fetcher: &dyn Fetcher,
    url: &str,
    headers: &[(&str, &str)],
) -> InstallerResult<T> {
    let body = fetcher.get_bytes(url, headers).await?;
    Ok(serde_json::from_slice(&body)?)
}

/// GET `url` as UTF-8 text.
pub async fn fetch_text(fetcher: &dyn Fetcher, url: &str) -> InstallerResult<String> {
    let body = fetcher.get_bytes(url, &[]).await?;
    String::from_utf8(body)
        .map_err(|e| InstallerError::Other(format!("Response from {} is not UTF-8: {}", url, e)))
}

/// Turn an HTTP 404 into a `NotFound` describing what was looked up.
pub fn not_found_as(what: impl Into<String>) -> impl FnOnce(InstallerError) -> InstallerError {
    let what = what.into();
    move |err| match err {
        InstallerError::HttpStatus { status: 404, .. } => InstallerError::NotFound(what),
        other => other,
    }
}
