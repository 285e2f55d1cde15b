use std::collections::BTreeSet;
use std::ffi::OsString;

use serde::Deserialize;
use tracing::info;

use super::context::InstallContext;
use super::installer::{is_alias, LoaderInstallResult, LoaderInstaller};
use crate::core::downloader::{fetch_json, not_found_as, Fetcher};
use crate::core::error::{InstallerError, InstallerResult};
use crate::core::java::run_java_jar;
use crate::core::maven::{metadata_url, MavenArtifact, MavenMetadata, QUILT_MAVEN};

const QUILT_META_BASE: &str = "https://meta.quiltmc.org/v3";
const SERVER_ENTRY: &str = "quilt-server-launch.jar";
const VANILLA_SERVER: &str = "server.jar";

/// Installs Quilt by running the Quilt installer in server mode.
pub struct QuiltInstaller;

#[derive(Deserialize)]
struct QuiltLoaderEntry {
    loader: QuiltLoaderVersion,
}

#[derive(Deserialize)]
struct QuiltLoaderVersion {
    version: String,
}

/// Newest loader without a pre-release suffix, else the newest.
fn pick_loader(versions: &[String]) -> Option<String> {
    versions
        .iter()
        .find(|v| !v.contains('-'))
        .or_else(|| versions.first())
        .cloned()
}

fn installer_version(metadata: &MavenMetadata) -> Option<String> {
    metadata
        .versioning
        .release
        .clone()
        .or_else(|| metadata.versioning.latest.clone())
        .or_else(|| metadata.versions().last().cloned())
}

#[async_trait::async_trait]
impl LoaderInstaller for QuiltInstaller {
    async fn resolve_version(
        &self,
        fetcher: &dyn Fetcher,
        minecraft_version: &str,
        requested: &str,
    ) -> InstallerResult<String> {
        if !is_alias(requested, &["latest"]) {
            return Ok(requested.trim().to_string());
        }

        let url = format!("{}/versions/loader/{}", QUILT_META_BASE, minecraft_version);
        let entries: Vec<QuiltLoaderEntry> = fetch_json(fetcher, &url, &[])
            .await
            .map_err(not_found_as(format!("Quilt loaders for {}", minecraft_version)))?;
        let versions: Vec<String> = entries.into_iter().map(|e| e.loader.version).collect();

        pick_loader(&versions).ok_or_else(|| {
            InstallerError::NoApplicableVersion(format!(
                "no Quilt loader for Minecraft {}",
                minecraft_version
            ))
        })
    }

    async fn install(&self, ctx: InstallContext<'_>) -> InstallerResult<LoaderInstallResult> {
        info!(
            "Installing Quilt loader {} for MC {}",
            ctx.loader_version, ctx.minecraft_version
        );

        let url = metadata_url(QUILT_MAVEN, "org.quiltmc", "quilt-installer");
        let metadata = MavenMetadata::fetch(ctx.fetcher, &url).await?;
        let version = installer_version(&metadata)
            .ok_or_else(|| InstallerError::NotFound("Quilt installer release".into()))?;
        let candidates = [MavenArtifact::new("org.quiltmc", "quilt-installer", &version)];
        let (installer_path, _) = ctx.fetch_installer(QUILT_MAVEN, &candidates).await?;

        let mut install_dir = OsString::from("--install-dir=");
        install_dir.push(ctx.output_dir.as_os_str());
        let args: Vec<OsString> = vec![
            "install".into(),
            "server".into(),
            ctx.minecraft_version.into(),
            ctx.loader_version.into(),
            install_dir,
            "--download-server".into(),
        ];
        let log = run_java_jar("Quilt", ctx.java, &installer_path, &args, ctx.output_dir).await?;

        if !ctx.output_dir.join(SERVER_ENTRY).is_file() {
            return Err(InstallerError::ExternalInstaller {
                installer: "Quilt".into(),
                code: Some(0),
                log: format!("{} was not created\n{}", SERVER_ENTRY, log),
            });
        }

        let mut files = BTreeSet::from([SERVER_ENTRY.to_string()]);
        if ctx.output_dir.join(VANILLA_SERVER).is_file() {
            files.insert(VANILLA_SERVER.to_string());
        }

        info!("Quilt installed successfully");
        Ok(LoaderInstallResult {
            server_entry: SERVER_ENTRY.to_string(),
            files,
        })
    }
}
