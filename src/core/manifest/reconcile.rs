use std::path::Path;

use tracing::{debug, info, warn};

use super::model::InstallManifest;
use crate::core::error::InstallerResult;
use crate::core::modpack::sanitize_pack_path;

/// What a reconciliation pass removed.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReconcileReport {
    pub removed: Vec<String>,
    /// Stale paths that could not be deleted.
    pub failed: Vec<String>,
}

/// Delete files recorded by `previous` but absent from `next`, then persist
/// `next` as the manifest for `target_id`.
///
/// The new manifest is written only after cleanup was attempted, so a crash
/// in between leaves the old manifest in place.
pub async fn reconcile(
    output_dir: &Path,
    target_id: &str,
    previous: Option<&InstallManifest>,
    next: &InstallManifest,
) -> InstallerResult<ReconcileReport> {
    let mut report = ReconcileReport::default();

    if let Some(previous) = previous {
        for stale in previous.files.difference(&next.files) {
            let Ok(rel) = sanitize_pack_path(stale) else {
                warn!("Refusing to delete manifest path outside output: {}", stale);
                report.failed.push(stale.clone());
                continue;
            };

            let path = output_dir.join(&rel);
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {
                    debug!("Removed stale file {}", rel);
                    report.removed.push(stale.clone());
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    debug!("Stale file already gone: {}", rel);
                }
                Err(e) => {
                    warn!("Failed to remove stale file {:?}: {}", path, e);
                    report.failed.push(stale.clone());
                }
            }
        }

        if !report.removed.is_empty() {
            info!(
                "Removed {} file(s) no longer part of {}",
                report.removed.len(),
                target_id
            );
        }
    }

    next.save(output_dir, target_id).await?;
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::manifest::ManifestKind;
    use tempfile::TempDir;

    fn touch(root: &Path, rel: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, rel.as_bytes()).unwrap();
    }

    fn manifest(files: &[&str]) -> InstallManifest {
        InstallManifest::new(ManifestKind::ModrinthModpack)
            .with_files(files.iter().map(|f| f.to_string()))
    }

    #[tokio::test]
    async fn deletes_exactly_the_set_difference() {
        let dir = TempDir::new().unwrap();
        for f in ["mods/a.jar", "mods/b.jar", "mods/c.jar", "mods/d.jar", "user.txt"] {
            touch(dir.path(), f);
        }

        let previous = manifest(&["mods/a.jar", "mods/b.jar", "mods/c.jar"]);
        let next = manifest(&["mods/b.jar", "mods/c.jar", "mods/d.jar"]);

        let report = reconcile(dir.path(), "modrinth-modpack", Some(&previous), &next)
            .await
            .unwrap();

        assert_eq!(report.removed, vec!["mods/a.jar"]);
        assert!(!dir.path().join("mods/a.jar").exists());
        for kept in ["mods/b.jar", "mods/c.jar", "mods/d.jar", "user.txt"] {
            assert!(dir.path().join(kept).exists(), "{} was deleted", kept);
        }
    }

    #[tokio::test]
    async fn first_run_only_persists() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "mods/a.jar");

        let next = manifest(&["mods/a.jar"]);
        let report = reconcile(dir.path(), "modrinth-modpack", None, &next)
            .await
            .unwrap();

        assert_eq!(report, ReconcileReport::default());
        let saved = InstallManifest::load(dir.path(), "modrinth-modpack")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(saved.files, next.files);
    }

    #[tokio::test]
    async fn undeletable_file_does_not_stop_cleanup() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "mods/old.jar");
        // A non-empty directory where a file was recorded cannot be unlinked.
        touch(dir.path(), "mods/stuck.jar/inner");

        let previous = manifest(&["mods/stuck.jar", "mods/old.jar"]);
        let next = manifest(&[]);

        let report = reconcile(dir.path(), "modrinth-modpack", Some(&previous), &next)
            .await
            .unwrap();

        assert_eq!(report.removed, vec!["mods/old.jar"]);
        assert_eq!(report.failed, vec!["mods/stuck.jar"]);
        let saved = InstallManifest::load(dir.path(), "modrinth-modpack")
            .await
            .unwrap()
            .unwrap();
        assert!(saved.files.is_empty());
    }

    #[tokio::test]
    async fn escaping_paths_are_never_deleted() {
        let outer = TempDir::new().unwrap();
        let out = outer.path().join("server");
        std::fs::create_dir_all(&out).unwrap();
        touch(outer.path(), "precious.txt");

        let previous = manifest(&["../precious.txt"]);
        let report = reconcile(&out, "copy", Some(&previous), &manifest(&[]))
            .await
            .unwrap();

        assert_eq!(report.failed, vec!["../precious.txt"]);
        assert!(outer.path().join("precious.txt").exists());
    }
}
