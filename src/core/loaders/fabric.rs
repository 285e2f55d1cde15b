use serde::Deserialize;
use tracing::info;

use super::context::InstallContext;
use super::installer::{is_alias, LoaderInstallResult, LoaderInstaller};
use crate::core::downloader::{fetch_json, not_found_as, Fetcher};
use crate::core::error::{InstallerError, InstallerResult};

const FABRIC_META_BASE: &str = "https://meta.fabricmc.net/v2";

/// Installs Fabric by downloading the self-contained server launcher jar.
pub struct FabricInstaller;

#[derive(Debug, Deserialize)]
struct LoaderEntry {
    loader: MetaVersion,
}

#[derive(Debug, Clone, Deserialize)]
struct MetaVersion {
    version: String,
    #[serde(default)]
    stable: bool,
}

/// First stable entry in Meta's newest-first order, else the newest.
fn first_stable(versions: &[MetaVersion]) -> Option<String> {
    versions
        .iter()
        .find(|v| v.stable)
        .or_else(|| versions.first())
        .map(|v| v.version.clone())
}

fn launcher_file_name(minecraft_version: &str, loader: &str, installer: &str) -> String {
    format!(
        "fabric-server-mc.{}-loader.{}-launcher.{}.jar",
        minecraft_version, loader, installer
    )
}

impl FabricInstaller {
    async fn latest_installer(fetcher: &dyn Fetcher) -> InstallerResult<String> {
        let url = format!("{}/versions/installer", FABRIC_META_BASE);
        let installers: Vec<MetaVersion> = fetch_json(fetcher, &url, &[]).await?;
        first_stable(&installers)
            .ok_or_else(|| InstallerError::NoApplicableVersion("no Fabric installer published".into()))
    }
}

#[async_trait::async_trait]
impl LoaderInstaller for FabricInstaller {
    async fn resolve_version(
        &self,
        fetcher: &dyn Fetcher,
        minecraft_version: &str,
        requested: &str,
    ) -> InstallerResult<String> {
        if !is_alias(requested, &["latest"]) {
            return Ok(requested.trim().to_string());
        }

        let url = format!("{}/versions/loader/{}", FABRIC_META_BASE, minecraft_version);
        let entries: Vec<LoaderEntry> = fetch_json(fetcher, &url, &[])
            .await
            .map_err(not_found_as(format!("Fabric loaders for {}", minecraft_version)))?;
        let loaders: Vec<MetaVersion> = entries.into_iter().map(|e| e.loader).collect();

        first_stable(&loaders).ok_or_else(|| {
            InstallerError::NoApplicableVersion(format!(
                "no Fabric loader for Minecraft {}",
                minecraft_version
            ))
        })
    }

    async fn install(&self, ctx: InstallContext<'_>) -> InstallerResult<LoaderInstallResult> {
        info!(
            "Installing Fabric {} for Minecraft {}",
            ctx.loader_version, ctx.minecraft_version
        );

        let installer = Self::latest_installer(ctx.fetcher).await?;
        let name = launcher_file_name(ctx.minecraft_version, ctx.loader_version, &installer);
        let url = format!(
            "{}/versions/loader/{}/{}/{}/server/jar",
            FABRIC_META_BASE, ctx.minecraft_version, ctx.loader_version, installer
        );

        ctx.fetcher
            .download_file(&url, &ctx.output_dir.join(&name), &[])
            .await
            .map_err(not_found_as(format!(
                "Fabric {} for Minecraft {}",
                ctx.loader_version, ctx.minecraft_version
            )))?;

        info!("Fabric installed successfully as {}", name);
        Ok(LoaderInstallResult::single(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn launcher_name_encodes_all_versions() {
        assert_eq!(
            launcher_file_name("1.20.1", "0.15.7", "1.0.0"),
            "fabric-server-mc.1.20.1-loader.0.15.7-launcher.1.0.0.jar"
        );
    }

    #[test]
    fn first_stable_skips_unstable_entries() {
        let versions: Vec<MetaVersion> = serde_json::from_str(
            r#"[{"version":"0.16.0-beta.1","stable":false},{"version":"0.15.11","stable":true}]"#,
        )
        .unwrap();
        assert_eq!(first_stable(&versions).as_deref(), Some("0.15.11"));
    }

    #[test]
    fn no_stable_entry_falls_back_to_newest() {
        let versions: Vec<MetaVersion> =
            serde_json::from_str(r#"[{"version":"1.0.0-rc.1"}]"#).unwrap();
        assert_eq!(first_stable(&versions).as_deref(), Some("1.0.0-rc.1"));
        assert_eq!(first_stable(&[]), None);
    }
}
