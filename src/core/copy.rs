// ─── Copy Files ───
// Multi-source copy into one destination, tracked by its own scope manifest.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::core::downloader::Fetcher;
use crate::core::error::{InstallerError, InstallerResult};
use crate::core::manifest::{reconcile, InstallManifest, ManifestKind, ReconcileReport};
use crate::core::overrides::GlobSet;

#[derive(Debug, Clone)]
pub struct CopyRequest {
    /// Manifest target id, so several copy operations can share a destination.
    pub scope: String,
    pub destination: PathBuf,
    /// Local files, local directories or HTTP(S) URLs.
    pub sources: Vec<String>,
    /// Applied to files found inside source directories.
    pub glob: Option<GlobSet>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyReport {
    pub files: BTreeSet<String>,
    pub copied: usize,
    pub cleanup: ReconcileReport,
}

enum Source {
    Url(String),
    File(PathBuf),
    Dir(PathBuf),
}

fn classify(raw: &str) -> InstallerResult<Source> {
    if raw.starts_with("http://") || raw.starts_with("https://") {
        return Ok(Source::Url(raw.to_string()));
    }
    let path = PathBuf::from(raw);
    if path.is_dir() {
        Ok(Source::Dir(path))
    } else if path.is_file() {
        Ok(Source::File(path))
    } else {
        Err(InstallerError::InvalidParameter(format!(
            "copy source '{}' does not exist",
            raw
        )))
    }
}

fn url_file_name(url: &str) -> InstallerResult<String> {
    url.split(['?', '#'])
        .next()
        .and_then(|u| u.rsplit('/').next())
        .filter(|name| !name.is_empty() && !name.contains("://"))
        .map(str::to_string)
        .ok_or_else(|| {
            InstallerError::InvalidParameter(format!("cannot derive a file name from '{}'", url))
        })
}

/// Relative paths of every file below `dir`, using `/` separators.
fn collect_files(dir: &Path, prefix: &str, out: &mut Vec<(PathBuf, String)>) -> InstallerResult<()> {
    let entries = std::fs::read_dir(dir).map_err(|e| InstallerError::io(dir, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| InstallerError::io(dir, e))?;
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().to_string();
        let rel = if prefix.is_empty() {
            name
        } else {
            format!("{}/{}", prefix, name)
        };

        let file_type = entry.file_type().map_err(|e| InstallerError::io(&path, e))?;
        if file_type.is_dir() {
            collect_files(&path, &rel, out)?;
        } else if file_type.is_file() {
            out.push((path, rel));
        }
    }
    Ok(())
}

/// Whether `dest` already holds an up-to-date copy of `src`.
fn is_current(src: &Path, dest: &Path) -> bool {
    let (Ok(src_meta), Ok(dest_meta)) = (std::fs::metadata(src), std::fs::metadata(dest)) else {
        return false;
    };
    if src_meta.len() != dest_meta.len() {
        return false;
    }
    match (src_meta.modified(), dest_meta.modified()) {
        (Ok(src_time), Ok(dest_time)) => dest_time >= src_time,
        _ => false,
    }
}

async fn copy_one(src: &Path, dest_dir: &Path, rel: &str) -> InstallerResult<bool> {
    let dest = dest_dir.join(rel);
    if is_current(src, &dest) {
        debug!("Unchanged {}", rel);
        return Ok(false);
    }
    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| InstallerError::io(parent, e))?;
    }
    tokio::fs::copy(src, &dest)
        .await
        .map_err(|e| InstallerError::io(&dest, e))?;
    debug!("Copied {:?} to {}", src, rel);
    Ok(true)
}

/// Copy every source into the destination, then prune files a previous
/// copy of the same scope produced that are no longer part of the set.
pub async fn copy_files(fetcher: &dyn Fetcher, request: &CopyRequest) -> InstallerResult<CopyReport> {
    if request.scope.trim().is_empty() {
        return Err(InstallerError::InvalidParameter("copy scope is empty".into()));
    }
    let sources = request
        .sources
        .iter()
        .map(|raw| classify(raw))
        .collect::<InstallerResult<Vec<_>>>()?;

    let dest_dir = &request.destination;
    tokio::fs::create_dir_all(dest_dir)
        .await
        .map_err(|e| InstallerError::io(dest_dir, e))?;
    let previous = InstallManifest::load(dest_dir, &request.scope).await?;

    let mut files = BTreeSet::new();
    let mut copied = 0;
    for source in sources {
        match source {
            Source::Url(url) => {
                let name = url_file_name(&url)?;
                fetcher.download_file(&url, &dest_dir.join(&name), &[]).await?;
                files.insert(name);
            }
            Source::File(path) => {
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .ok_or_else(|| {
                        InstallerError::InvalidParameter(format!("{:?} has no file name", path))
                    })?;
                if copy_one(&path, dest_dir, &name).await? {
                    copied += 1;
                }
                files.insert(name);
            }
            Source::Dir(dir) => {
                let mut found = Vec::new();
                collect_files(&dir, "", &mut found)?;
                for (path, rel) in found {
                    let file_name = rel.rsplit('/').next().unwrap_or(&rel);
                    let wanted = request
                        .glob
                        .as_ref()
                        .map_or(true, |g| g.is_match(&rel) || g.is_match(file_name));
                    if !wanted {
                        continue;
                    }
                    if copy_one(&path, dest_dir, &rel).await? {
                        copied += 1;
                    }
                    files.insert(rel);
                }
            }
        }
    }

    let manifest = InstallManifest::new(ManifestKind::CopyFiles).with_files(files.iter().cloned());
    let cleanup = reconcile(dest_dir, &request.scope, previous.as_ref(), &manifest).await?;

    info!(
        "Copy scope '{}': {} file(s), {} copied, {} removed",
        request.scope,
        files.len(),
        copied,
        cleanup.removed.len()
    );
    Ok(CopyReport {
        files,
        copied,
        cleanup,
    })
}
