use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{IF_MODIFIED_SINCE, LAST_MODIFIED};
use reqwest::{Client, StatusCode};
use tokio::io::AsyncWriteExt;
use tokio_retry::strategy::ExponentialBackoff;
use tokio_retry::RetryIf;
use tracing::{debug, warn};

use super::fetcher::{DownloadOutcome, Fetcher};
use crate::core::error::{InstallerError, InstallerResult};
use crate::core::http::build_http_client;

/// Bounded retry of transient failures.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: usize,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// Delays between attempts: initial, 2x initial, 4x initial... capped.
    fn strategy(&self) -> impl Iterator<Item = Duration> {
        let half = (self.initial_delay.as_millis() as u64 / 2).max(1);
        ExponentialBackoff::from_millis(2)
            .factor(half)
            .max_delay(self.max_delay)
            .take(self.max_attempts.saturating_sub(1))
    }
}

/// reqwest-backed fetcher with retry and conditional GET.
pub struct HttpFetcher {
    client: Client,
    retry: RetryPolicy,
}

impl HttpFetcher {
    pub fn new(retry: RetryPolicy) -> InstallerResult<Self> {
        Ok(Self {
            client: build_http_client()?,
            retry,
        })
    }

    async fn get_once(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        if_modified_since: Option<&str>,
    ) -> InstallerResult<reqwest::Response> {
        let mut request = self.client.get(url);
        for (name, value) in headers {
            request = request.header(*name, *value);
        }
        if let Some(since) = if_modified_since {
            request = request.header(IF_MODIFIED_SINCE, since);
        }

        let response = request.send().await?;
        let status = response.status();
        if status == StatusCode::NOT_MODIFIED || status.is_success() {
            return Ok(response);
        }

        Err(InstallerError::HttpStatus {
            url: url.to_string(),
            status: status.as_u16(),
        })
    }

    /// Send with retry. Only failures classified as transient are retried.
    async fn get_with_retry(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        if_modified_since: Option<&str>,
    ) -> InstallerResult<reqwest::Response> {
        RetryIf::spawn(
            self.retry.strategy(),
            || self.get_once(url, headers, if_modified_since),
            |err: &InstallerError| {
                let transient = err.is_transient();
                if transient {
                    warn!("Transient failure fetching {}: {} (retrying)", url, err);
                }
                transient
            },
        )
        .await
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn get_bytes(&self, url: &str, headers: &[(&str, &str)]) -> InstallerResult<Vec<u8>> {
        let response = self.get_with_retry(url, headers, None).await?;
        let bytes = response.bytes().await?;
        debug!("Fetched {} ({} bytes)", url, bytes.len());
        Ok(bytes.to_vec())
    }

    async fn download_file(
        &self,
        url: &str,
        dest: &Path,
        headers: &[(&str, &str)],
    ) -> InstallerResult<DownloadOutcome> {
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| InstallerError::io(parent, e))?;
        }

        let since = modified_http_date(dest).await;
        let response = self.get_with_retry(url, headers, since.as_deref()).await?;

        if response.status() == StatusCode::NOT_MODIFIED {
            debug!("Up to date: {} -> {:?}", url, dest);
            return Ok(DownloadOutcome::UpToDate);
        }

        let last_modified = response
            .headers()
            .get(LAST_MODIFIED)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| DateTime::parse_from_rfc2822(v).ok());
        let bytes = response.bytes().await?;

        write_atomically(dest, &bytes).await?;

        if let Some(modified) = last_modified {
            stamp_modified(dest, modified.into())?;
        }

        debug!("Downloaded: {} -> {:?}", url, dest);
        Ok(DownloadOutcome::Downloaded)
    }
}

/// Write to a sibling `.part` file and rename into place.
async fn write_atomically(dest: &Path, bytes: &[u8]) -> InstallerResult<()> {
    let mut part = dest.as_os_str().to_owned();
    part.push(".part");
    let part = PathBuf::from(part);

    // File handle is dropped before the rename.
    {
        let mut file = tokio::fs::File::create(&part)
            .await
            .map_err(|e| InstallerError::io(&part, e))?;
        file.write_all(bytes)
            .await
            .map_err(|e| InstallerError::io(&part, e))?;
        file.flush().await.map_err(|e| InstallerError::io(&part, e))?;
    }

    tokio::fs::rename(&part, dest)
        .await
        .map_err(|e| InstallerError::io(dest, e))
}

/// Give the file the server's `Last-Modified` so the next run can send it back.
fn stamp_modified(dest: &Path, modified: DateTime<Utc>) -> InstallerResult<()> {
    let file = std::fs::File::options()
        .write(true)
        .open(dest)
        .map_err(|e| InstallerError::io(dest, e))?;
    if let Err(e) = file.set_modified(SystemTime::from(modified)) {
        debug!("Could not set mtime of {:?}: {}", dest, e);
    }
    Ok(())
}

async fn modified_http_date(path: &Path) -> Option<String> {
    let metadata = tokio::fs::metadata(path).await.ok()?;
    let modified: DateTime<Utc> = metadata.modified().ok()?.into();
    Some(http_date(modified))
}

fn http_date(at: DateTime<Utc>) -> String {
    at.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}
