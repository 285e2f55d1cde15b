use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::core::downloader::Fetcher;
use crate::core::error::{InstallerError, InstallerResult};
use crate::core::maven::MavenArtifact;

/// Everything a loader installer needs for one install.
pub struct InstallContext<'a> {
    pub minecraft_version: &'a str,
    /// Concrete loader version, already resolved from any alias.
    pub loader_version: &'a str,
    pub output_dir: &'a Path,
    /// Scratch space for installer jars; removed after the install.
    pub work_dir: &'a Path,
    pub fetcher: &'a dyn Fetcher,
    pub java: &'a Path,
}

impl InstallContext<'_> {
    /// Download the first of `candidates` that exists in `repo` into the work
    /// directory. Missing coordinates fall through to the next candidate.
    pub async fn fetch_installer(
        &self,
        repo: &str,
        candidates: &[MavenArtifact],
    ) -> InstallerResult<(PathBuf, MavenArtifact)> {
        for artifact in candidates {
            let url = artifact.url(repo);
            let dest = self.work_dir.join(artifact.filename());
            match self.fetcher.download_file(&url, &dest, &[]).await {
                Ok(_) => {
                    info!("Downloaded installer {}", artifact);
                    return Ok((dest, artifact.clone()));
                }
                Err(InstallerError::HttpStatus { status: 404, .. }) => {
                    debug!("No installer at {}", url);
                }
                Err(e) => return Err(e),
            }
        }

        Err(InstallerError::NotFound(format!(
            "installer for {} (tried {})",
            self.loader_version,
            candidates
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        )))
    }
}
