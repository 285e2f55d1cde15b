use std::path::Path;

use tracing::info;

use super::context::InstallContext;
use super::installer::Installer;
use super::spec::{LoaderKind, LoaderSpec};
use crate::core::downloader::Fetcher;
use crate::core::error::{InstallerError, InstallerResult};
use crate::core::java::resolve_java_binary;
use crate::core::manifest::{reconcile, InstallManifest};
use crate::core::results::ResultsFile;

const MINECRAFT_VERSION: &str = "minecraftVersion";
const LOADER_VERSION: &str = "loaderVersion";
const SERVER_ENTRY: &str = "serverEntry";

/// Result of one dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoaderOutcome {
    pub kind: LoaderKind,
    pub minecraft_version: String,
    pub loader_version: String,
    pub server_entry: String,
    /// False when the recorded install was still current.
    pub installed: bool,
}

/// Install the loader named by `spec`, if any, into `output_dir`.
///
/// Skips the installer when the loader's own manifest records the same
/// Minecraft and loader versions and the recorded entry point still exists.
/// `SERVER` and `FAMILY` are written to `results` either way.
pub async fn install_loader(
    spec: &LoaderSpec,
    output_dir: &Path,
    fetcher: &dyn Fetcher,
    results: &ResultsFile,
    force_reinstall: bool,
) -> InstallerResult<Option<LoaderOutcome>> {
    let Some(request) = &spec.loader else {
        info!("No mod loader requested for Minecraft {}", spec.minecraft_version);
        return Ok(None);
    };
    if spec.minecraft_version.trim().is_empty() {
        return Err(InstallerError::InvalidParameter(
            "a Minecraft version is required to install a mod loader".into(),
        ));
    }

    let kind = request.kind;
    let installer = Installer::new(kind);
    let loader_version = installer
        .resolve_version(fetcher, &spec.minecraft_version, &request.version)
        .await?;

    let previous = InstallManifest::load(output_dir, kind.id()).await?;
    let current_entry = previous.as_ref().and_then(|m| {
        let same = m.field(MINECRAFT_VERSION) == Some(spec.minecraft_version.as_str())
            && m.field(LOADER_VERSION) == Some(loader_version.as_str());
        m.field(SERVER_ENTRY)
            .filter(|entry| same && output_dir.join(entry).is_file())
            .map(str::to_string)
    });

    let (server_entry, installed) = match current_entry {
        Some(entry) if !force_reinstall => {
            info!(
                "{} {} for Minecraft {} is already installed",
                kind, loader_version, spec.minecraft_version
            );
            (entry, false)
        }
        _ => {
            let work_dir = tempfile::tempdir().map_err(|e| InstallerError::io(output_dir, e))?;
            let java = resolve_java_binary();
            tokio::fs::create_dir_all(output_dir)
                .await
                .map_err(|e| InstallerError::io(output_dir, e))?;

            let result = installer
                .install(InstallContext {
                    minecraft_version: &spec.minecraft_version,
                    loader_version: &loader_version,
                    output_dir,
                    work_dir: work_dir.path(),
                    fetcher,
                    java: &java,
                })
                .await?;

            let manifest = InstallManifest::new(kind.manifest_kind())
                .with_files(result.files)
                .with_field(MINECRAFT_VERSION, spec.minecraft_version.as_str())
                .with_field(LOADER_VERSION, loader_version.as_str())
                .with_field(SERVER_ENTRY, result.server_entry.as_str());
            reconcile(output_dir, kind.id(), previous.as_ref(), &manifest).await?;

            (result.server_entry, true)
        }
    };

    results
        .write(&[("SERVER", server_entry.as_str()), ("FAMILY", kind.family())])
        .await?;

    Ok(Some(LoaderOutcome {
        kind,
        minecraft_version: spec.minecraft_version.clone(),
        loader_version,
        server_entry,
        installed,
    }))
}
