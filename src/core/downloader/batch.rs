use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use futures_util::stream::{self, StreamExt};
use sha1::{Digest, Sha1};
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use super::fetcher::{DownloadOutcome, Fetcher};
use crate::core::error::{InstallerError, InstallerResult};

/// A single file to download, with its candidate mirrors.
#[derive(Debug, Clone)]
pub struct DownloadEntry {
    /// Path relative to the output directory, as recorded in manifests.
    pub rel_path: String,
    /// Candidate URLs tried in order.
    pub urls: Vec<String>,
    pub sha1: Option<String>,
    /// A failed optional download is logged and left out of the result.
    pub optional: bool,
}

type InFlight = Arc<OnceCell<Result<(), Arc<InstallerError>>>>;

/// Bounded pool for per-file downloads within one installation.
///
/// Two entries targeting the same destination collapse onto one transfer:
/// the first caller performs it, later callers await the same result.
pub struct DownloadPool<'a> {
    fetcher: &'a dyn Fetcher,
    output_dir: &'a Path,
    concurrency: usize,
    in_flight: Mutex<HashMap<PathBuf, InFlight>>,
}

impl<'a> DownloadPool<'a> {
    pub fn new(fetcher: &'a dyn Fetcher, output_dir: &'a Path, concurrency: usize) -> Self {
        Self {
            fetcher,
            output_dir,
            concurrency: concurrency.max(1),
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Download every entry and wait for all of them.
    ///
    /// Returns the relative paths that are now present. A failed required
    /// entry fails the whole batch, but only after every transfer finished.
    pub async fn download_all(&self, entries: Vec<DownloadEntry>) -> InstallerResult<BTreeSet<String>> {
        info!(
            "Starting batch download: {} files, concurrency={}",
            entries.len(),
            self.concurrency
        );

        let results: Vec<_> = stream::iter(entries)
            .map(|entry| async move {
                let result = self.download_deduplicated(&entry).await;
                (entry, result)
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let mut installed = BTreeSet::new();
        let mut first_required_failure = None;

        for (entry, result) in results {
            match result {
                Ok(()) => {
                    installed.insert(entry.rel_path);
                }
                Err(source) if entry.optional => {
                    warn!("Skipping optional file {}: {}", entry.rel_path, source);
                }
                Err(source) => {
                    if first_required_failure.is_none() {
                        first_required_failure = Some(InstallerError::Download {
                            rel_path: entry.rel_path,
                            source,
                        });
                    }
                }
            }
        }

        match first_required_failure {
            Some(err) => Err(err),
            None => Ok(installed),
        }
    }

    async fn download_deduplicated(&self, entry: &DownloadEntry) -> Result<(), Arc<InstallerError>> {
        let dest = self.output_dir.join(&entry.rel_path);
        let cell = {
            let mut in_flight = self
                .in_flight
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            in_flight.entry(dest.clone()).or_default().clone()
        };

        cell.get_or_init(|| async { self.download_one(entry, &dest).await.map_err(Arc::new) })
        .await
        .clone()
    }

    async fn download_one(&self, entry: &DownloadEntry, dest: &Path) -> InstallerResult<()> {
        if let Some(expected) = &entry.sha1 {
            if dest.exists() {
                if sha1_matches(dest, expected).await? {
                    debug!("Already present: {}", entry.rel_path);
                    return Ok(());
                }
                // A conditional request against a damaged file could answer 304.
                debug!("Replacing damaged {}", entry.rel_path);
                remove_if_present(dest).await?;
            }
        }

        let outcome = self.fetch_from_mirrors(entry, dest).await?;

        if let Some(expected) = &entry.sha1 {
            if outcome == DownloadOutcome::UpToDate
                && !(dest.exists() && sha1_matches(dest, expected).await?)
            {
                debug!("Stale not-modified answer for {}, fetching again", entry.rel_path);
                remove_if_present(dest).await?;
                self.fetch_from_mirrors(entry, dest).await?;
            }

            let actual = sha1_hex(dest).await?;
            if !actual.eq_ignore_ascii_case(expected) {
                if let Err(e) = remove_if_present(dest).await {
                    warn!("Could not remove mismatched {}: {}", entry.rel_path, e);
                }
                return Err(InstallerError::Sha1Mismatch {
                    path: dest.to_path_buf(),
                    expected: expected.clone(),
                    actual,
                });
            }
        }

        Ok(())
    }

    /// Try each mirror in order; the last mirror's error wins.
    async fn fetch_from_mirrors(
        &self,
        entry: &DownloadEntry,
        dest: &Path,
    ) -> InstallerResult<DownloadOutcome> {
        let mut last_err = None;
        for url in &entry.urls {
            match self.fetcher.download_file(url, dest, &[]).await {
                Ok(outcome) => return Ok(outcome),
                Err(e) => {
                    debug!("Mirror {} failed for {}: {}", url, entry.rel_path, e);
                    last_err = Some(e);
                }
            }
        }
        Err(last_err.unwrap_or_else(|| {
            InstallerError::NotFound(format!("no download location for {}", entry.rel_path))
        }))
    }
}

async fn remove_if_present(path: &Path) -> InstallerResult<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(InstallerError::io(path, e)),
    }
}

pub async fn sha1_hex(path: &Path) -> InstallerResult<String> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| InstallerError::io(path, e))?;
    let mut hasher = Sha1::new();
    hasher.update(&bytes);
    Ok(hex::encode(hasher.finalize()))
}

/// Validate an existing file's SHA-1.
pub async fn sha1_matches(path: &Path, expected: &str) -> InstallerResult<bool> {
    Ok(sha1_hex(path).await?.eq_ignore_ascii_case(expected))
}
