use std::collections::BTreeSet;

use async_trait::async_trait;

use crate::core::downloader::Fetcher;
use crate::core::error::InstallerResult;

use super::{
    context::InstallContext, fabric::FabricInstaller, forge::ForgeInstaller,
    neoforge::NeoForgeInstaller, quilt::QuiltInstaller, spec::LoaderKind,
};

/// What a loader install left in the output directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoaderInstallResult {
    /// Output-relative path the server is started from.
    pub server_entry: String,
    /// Files owned by this loader install, pruned when the loader changes.
    pub files: BTreeSet<String>,
}

impl LoaderInstallResult {
    pub fn single(server_entry: String) -> Self {
        Self {
            files: BTreeSet::from([server_entry.clone()]),
            server_entry,
        }
    }
}

#[async_trait]
pub trait LoaderInstaller: Send + Sync {
    /// Turn an alias such as `latest` into a concrete version. Concrete
    /// versions come back unchanged without any network access.
    async fn resolve_version(
        &self,
        fetcher: &dyn Fetcher,
        minecraft_version: &str,
        requested: &str,
    ) -> InstallerResult<String>;

    async fn install(&self, ctx: InstallContext<'_>) -> InstallerResult<LoaderInstallResult>;
}

/// Dispatcher without Box<dyn>.
pub enum Installer {
    Forge(ForgeInstaller),
    NeoForge(NeoForgeInstaller),
    Fabric(FabricInstaller),
    Quilt(QuiltInstaller),
}

impl Installer {
    pub fn new(kind: LoaderKind) -> Self {
        match kind {
            LoaderKind::Forge => Self::Forge(ForgeInstaller),
            LoaderKind::NeoForge => Self::NeoForge(NeoForgeInstaller),
            LoaderKind::Fabric => Self::Fabric(FabricInstaller),
            LoaderKind::Quilt => Self::Quilt(QuiltInstaller),
        }
    }

    pub async fn resolve_version(
        &self,
        fetcher: &dyn Fetcher,
        minecraft_version: &str,
        requested: &str,
    ) -> InstallerResult<String> {
        match self {
            Installer::Forge(i) => i.resolve_version(fetcher, minecraft_version, requested).await,
            Installer::NeoForge(i) => {
                i.resolve_version(fetcher, minecraft_version, requested)
                    .await
            }
            Installer::Fabric(i) => i.resolve_version(fetcher, minecraft_version, requested).await,
            Installer::Quilt(i) => i.resolve_version(fetcher, minecraft_version, requested).await,
        }
    }

    pub async fn install(&self, ctx: InstallContext<'_>) -> InstallerResult<LoaderInstallResult> {
        match self {
            Installer::Forge(i) => i.install(ctx).await,
            Installer::NeoForge(i) => i.install(ctx).await,
            Installer::Fabric(i) => i.install(ctx).await,
            Installer::Quilt(i) => i.install(ctx).await,
        }
    }
}

/// `latest`-style aliases shared by every loader.
pub(crate) fn is_alias(requested: &str, aliases: &[&str]) -> bool {
    let requested = requested.trim();
    requested.is_empty() || aliases.iter().any(|a| requested.eq_ignore_ascii_case(a))
}
