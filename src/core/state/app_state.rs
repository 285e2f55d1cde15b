use std::path::PathBuf;
use std::sync::Arc;

use tracing::debug;

use crate::core::cache::{ApiCache, TtlConfig};
use crate::core::downloader::{Fetcher, HttpFetcher, RetryPolicy};
use crate::core::error::InstallerResult;
use crate::core::results::ResultsFile;

pub const DEFAULT_CONCURRENT_DOWNLOADS: usize = 4;

/// Effective configuration of one invocation.
#[derive(Debug, Clone)]
pub struct InstallerSettings {
    pub output_dir: PathBuf,
    pub results_file: Option<PathBuf>,
    pub concurrent_downloads: usize,
    pub api_caching: bool,
    pub cache_ttl: TtlConfig,
    pub retry: RetryPolicy,
}

impl Default for InstallerSettings {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
            results_file: None,
            concurrent_downloads: DEFAULT_CONCURRENT_DOWNLOADS,
            api_caching: true,
            cache_ttl: TtlConfig::default(),
            retry: RetryPolicy::default(),
        }
    }
}

/// Shared runtime objects for one invocation.
pub struct InstallerState {
    pub settings: InstallerSettings,
    pub fetcher: Arc<dyn Fetcher>,
    pub results: ResultsFile,
}

impl InstallerState {
    pub fn new(settings: InstallerSettings) -> InstallerResult<Self> {
        let fetcher = Arc::new(HttpFetcher::new(settings.retry.clone())?);
        Ok(Self::with_fetcher(settings, fetcher))
    }

    /// Use a caller-supplied fetcher, e.g. an offline one.
    pub fn with_fetcher(settings: InstallerSettings, fetcher: Arc<dyn Fetcher>) -> Self {
        debug!("Installer settings: {:?}", settings);
        let results = ResultsFile::new(settings.results_file.clone());
        Self {
            settings,
            fetcher,
            results,
        }
    }

    /// Upstream answer cache for one platform namespace.
    pub fn api_cache(&self, namespace: &str) -> ApiCache {
        ApiCache::open(
            &self.settings.output_dir,
            namespace,
            self.settings.api_caching,
            self.settings.cache_ttl.clone(),
        )
    }
}
