use std::future::Future;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::index::{CacheEntry, CacheIndex, CacheIndexStore};
use super::ttl::TtlConfig;
use crate::core::error::{InstallerError, InstallerResult};

const INDEX_FILE: &str = "cache-index.json";

/// Caches upstream API answers. Both variants share one interface so callers
/// never need to know whether caching is on.
pub enum ApiCache {
    Disk(DiskApiCache),
    Disabled,
}

impl ApiCache {
    /// Open the cache for `namespace` under `<output>/.cache/`, or the
    /// pass-through variant when `enabled` is false.
    pub fn open(output_dir: &Path, namespace: &str, enabled: bool, ttl: TtlConfig) -> Self {
        if !enabled {
            return ApiCache::Disabled;
        }
        let dir = output_dir.join(".cache").join(namespace);
        ApiCache::Disk(DiskApiCache::open(dir, ttl))
    }

    /// Return the cached answer for `operation(keys)`, or run `resolver` and
    /// remember what it returned.
    pub async fn cache<T, F, Fut>(
        &self,
        operation: &str,
        keys: &[&str],
        resolver: F,
    ) -> InstallerResult<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = InstallerResult<T>>,
    {
        match self {
            ApiCache::Disk(cache) => cache.cache(operation, keys, resolver).await,
            ApiCache::Disabled => resolver().await,
        }
    }

    /// Write the index back to disk. Failures are logged only.
    pub fn flush(&self) {
        if let ApiCache::Disk(cache) = self {
            if let Err(e) = cache.flush() {
                warn!("Failed to save API cache index: {}", e);
            }
        }
    }
}

/// Disk-backed cache: `cache-index.json` plus one payload file per entry in
/// `<operation>/<uuid>.json`.
pub struct DiskApiCache {
    dir: PathBuf,
    ttl: TtlConfig,
    index: CacheIndexStore,
}

impl DiskApiCache {
    /// Load the index and sweep expired entries and orphaned payloads.
    pub fn open(dir: PathBuf, ttl: TtlConfig) -> Self {
        let index = match load_index(&dir) {
            Ok(index) => index,
            Err(e) => {
                warn!("Ignoring unreadable API cache index in {:?}: {}", dir, e);
                CacheIndex::default()
            }
        };

        let cache = Self {
            dir,
            ttl,
            index: CacheIndexStore::new(index),
        };
        cache.sweep();
        cache
    }

    #[cfg(test)]
    pub fn entry_count(&self) -> usize {
        self.index.len()
    }

    pub async fn cache<T, F, Fut>(
        &self,
        operation: &str,
        keys: &[&str],
        resolver: F,
    ) -> InstallerResult<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = InstallerResult<T>>,
    {
        let key = keys.join(",");

        if let Some(entry) = self.index.get(operation, &key) {
            if entry.is_live(Utc::now()) {
                match self.read_payload::<T>(operation, &entry).await {
                    Ok(value) => {
                        debug!("API cache hit {}({})", operation, key);
                        return Ok(value);
                    }
                    Err(e) => {
                        warn!("Discarding unreadable cache payload for {}({}): {}", operation, key, e);
                        self.evict(operation, &key, &entry).await;
                    }
                }
            } else {
                debug!("API cache entry expired {}({})", operation, key);
                self.evict(operation, &key, &entry).await;
            }
        }

        let value = resolver().await?;

        if let Err(e) = self.store(operation, &key, &value).await {
            warn!("Failed to cache result of {}({}): {}", operation, key, e);
        }

        Ok(value)
    }

    async fn read_payload<T: DeserializeOwned>(
        &self,
        operation: &str,
        entry: &CacheEntry,
    ) -> InstallerResult<T> {
        let path = self.payload_path(operation, &entry.filename);
        let raw = tokio::fs::read(&path)
            .await
            .map_err(|e| InstallerError::io(&path, e))?;
        Ok(serde_json::from_slice(&raw)?)
    }

    async fn store<T: Serialize>(&self, operation: &str, key: &str, value: &T) -> InstallerResult<()> {
        let op_dir = self.dir.join(operation);
        tokio::fs::create_dir_all(&op_dir)
            .await
            .map_err(|e| InstallerError::io(&op_dir, e))?;

        let filename = format!("{}.json", Uuid::new_v4());
        let path = op_dir.join(&filename);
        let json = serde_json::to_vec(value)?;
        tokio::fs::write(&path, json)
            .await
            .map_err(|e| InstallerError::io(&path, e))?;

        let entry = CacheEntry {
            filename,
            expires_at: Utc::now() + self.ttl.ttl_for(operation),
        };
        if let Some(replaced) = self.index.put(operation, key, entry) {
            remove_payload(&self.payload_path(operation, &replaced.filename)).await;
        }
        Ok(())
    }

    /// Remove an entry together with its payload file.
    async fn evict(&self, operation: &str, key: &str, entry: &CacheEntry) {
        if self.index.remove_if(operation, key, entry) {
            remove_payload(&self.payload_path(operation, &entry.filename)).await;
        }
    }

    fn payload_path(&self, operation: &str, filename: &str) -> PathBuf {
        self.dir.join(operation).join(filename)
    }

    /// Drop expired entries, entries whose payload vanished, and payload
    /// files no entry references.
    pub fn sweep(&self) {
        let now = Utc::now();
        let expired = self.index.remove_expired(now);
        for (operation, entry) in &expired {
            let path = self.payload_path(operation, &entry.filename);
            if let Err(e) = std::fs::remove_file(&path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!("Failed to remove expired cache payload {:?}: {}", path, e);
                }
            }
        }

        let missing: Vec<_> = self
            .index
            .referenced_payloads()
            .into_iter()
            .filter(|(op, file)| !self.payload_path(op, file).exists())
            .collect();
        if !missing.is_empty() {
            self.index
                .remove_where(|entry| missing.iter().any(|(_, f)| *f == entry.filename));
        }

        let orphans = self.remove_orphaned_payloads();
        if !expired.is_empty() || !missing.is_empty() || orphans > 0 {
            info!(
                "API cache sweep: {} expired, {} missing payloads, {} orphaned files",
                expired.len(),
                missing.len(),
                orphans
            );
        }
    }

    fn remove_orphaned_payloads(&self) -> usize {
        let referenced = self.index.referenced_payloads();
        let Ok(op_dirs) = std::fs::read_dir(&self.dir) else {
            return 0;
        };

        let mut removed = 0;
        for op_dir in op_dirs.flatten() {
            let op_path = op_dir.path();
            if !op_path.is_dir() {
                continue;
            }
            let operation = op_dir.file_name().to_string_lossy().to_string();
            let Ok(files) = std::fs::read_dir(&op_path) else {
                continue;
            };
            for file in files.flatten() {
                let filename = file.file_name().to_string_lossy().to_string();
                if referenced.contains(&(operation.clone(), filename)) {
                    continue;
                }
                match std::fs::remove_file(file.path()) {
                    Ok(()) => removed += 1,
                    Err(e) => warn!("Failed to remove orphaned cache file {:?}: {}", file.path(), e),
                }
            }
        }
        removed
    }

    /// Persist the index atomically.
    pub fn flush(&self) -> InstallerResult<()> {
        std::fs::create_dir_all(&self.dir).map_err(|e| InstallerError::io(&self.dir, e))?;
        let path = self.dir.join(INDEX_FILE);
        let tmp = self.dir.join(format!("{}.tmp", INDEX_FILE));
        let json = serde_json::to_vec_pretty(&self.index.snapshot())?;
        std::fs::write(&tmp, json).map_err(|e| InstallerError::io(&tmp, e))?;
        std::fs::rename(&tmp, &path).map_err(|e| InstallerError::io(&path, e))?;
        debug!("Saved API cache index with {} entries", self.index.len());
        Ok(())
    }
}

fn load_index(dir: &Path) -> InstallerResult<CacheIndex> {
    let path = dir.join(INDEX_FILE);
    match std::fs::read(&path) {
        Ok(raw) => Ok(serde_json::from_slice(&raw)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(CacheIndex::default()),
        Err(e) => Err(InstallerError::io(path, e)),
    }
}

async fn remove_payload(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!("Failed to remove cache payload {:?}: {}", path, e);
        }
    }
}
