use tracing::info;

use super::context::InstallContext;
use super::installer::{is_alias, LoaderInstallResult, LoaderInstaller};
use super::scrape::{probe_entry_point, scrape_entry_point};
use crate::core::downloader::{not_found_as, Fetcher};
use crate::core::error::{InstallerError, InstallerResult};
use crate::core::java::run_java_jar;
use crate::core::maven::{metadata_url, MavenArtifact, MavenMetadata, NEOFORGE_MAVEN};

/// NeoForge installer. Same contract as Forge, different Maven and versioning.
pub struct NeoForgeInstaller;

const GROUP: &str = "net.neoforged";
/// NeoForge for 1.20.1 was published under the old artifact name.
const LEGACY_MINECRAFT: &str = "1.20.1";

fn artifact_id(minecraft_version: &str) -> &'static str {
    if minecraft_version == LEGACY_MINECRAFT {
        "forge"
    } else {
        "neoforge"
    }
}

/// `1.20.4` → `20.4.`, `1.21` → `21.0.`
fn version_prefix(minecraft_version: &str) -> Option<String> {
    if minecraft_version == LEGACY_MINECRAFT {
        return Some(format!("{}-", LEGACY_MINECRAFT));
    }
    let rest = minecraft_version.strip_prefix("1.")?;
    let mut parts = rest.split('.');
    let minor = parts.next().filter(|p| !p.is_empty())?;
    let patch = parts.next().unwrap_or("0");
    Some(format!("{}.{}.", minor, patch))
}

fn version_key(version: &str) -> Vec<u64> {
    let core = version
        .rsplit_once("1.20.1-")
        .map_or(version, |(_, v)| v)
        .split('-')
        .next()
        .unwrap_or(version);
    core.split('.').map(|p| p.parse().unwrap_or(0)).collect()
}

fn pick_version(
    versions: &[String],
    minecraft_version: &str,
    allow_beta: bool,
) -> InstallerResult<String> {
    let prefix = version_prefix(minecraft_version).ok_or_else(|| {
        InstallerError::InvalidParameter(format!(
            "unsupported Minecraft version for NeoForge: {}",
            minecraft_version
        ))
    })?;

    versions
        .iter()
        .filter(|v| v.starts_with(&prefix))
        .filter(|v| allow_beta || !v.contains("beta"))
        .max_by(|a, b| version_key(a).cmp(&version_key(b)))
        .cloned()
        .ok_or_else(|| {
            InstallerError::NoApplicableVersion(format!(
                "no NeoForge {}release for Minecraft {}",
                if allow_beta { "" } else { "stable " },
                minecraft_version
            ))
        })
}

fn entry_candidates(artifact: &MavenArtifact) -> Vec<String> {
    vec![
        format!(
            "libraries/net/neoforged/{}/{}/unix_args.txt",
            artifact.artifact_id, artifact.version
        ),
        format!("{}-{}-shim.jar", artifact.artifact_id, artifact.version),
        format!("{}-{}.jar", artifact.artifact_id, artifact.version),
    ]
}

#[async_trait::async_trait]
impl LoaderInstaller for NeoForgeInstaller {
    async fn resolve_version(
        &self,
        fetcher: &dyn Fetcher,
        minecraft_version: &str,
        requested: &str,
    ) -> InstallerResult<String> {
        if !is_alias(requested, &["latest", "beta"]) {
            return Ok(requested.trim().to_string());
        }

        let url = metadata_url(NEOFORGE_MAVEN, GROUP, artifact_id(minecraft_version));
        let metadata = MavenMetadata::fetch(fetcher, &url)
            .await
            .map_err(not_found_as(format!("NeoForge versions at {}", url)))?;

        let version = pick_version(
            metadata.versions(),
            minecraft_version,
            requested.trim().eq_ignore_ascii_case("beta"),
        )?;
        info!(
            "Resolved NeoForge {} for Minecraft {} to {}",
            requested, minecraft_version, version
        );
        Ok(version)
    }

    async fn install(&self, ctx: InstallContext<'_>) -> InstallerResult<LoaderInstallResult> {
        info!(
            "Installing NeoForge {} for MC {}",
            ctx.loader_version, ctx.minecraft_version
        );

        let artifact_id = artifact_id(ctx.minecraft_version);
        let version = if artifact_id == "forge" && !ctx.loader_version.starts_with(LEGACY_MINECRAFT) {
            format!("{}-{}", LEGACY_MINECRAFT, ctx.loader_version)
        } else {
            ctx.loader_version.to_string()
        };
        let candidates =
            [MavenArtifact::new(GROUP, artifact_id, &version).with_classifier("installer")];
        let (installer_path, artifact) = ctx.fetch_installer(NEOFORGE_MAVEN, &candidates).await?;

        let log = run_java_jar(
            "NeoForge",
            ctx.java,
            &installer_path,
            &[
                std::ffi::OsStr::new("--installServer"),
                ctx.output_dir.as_os_str(),
            ],
            ctx.output_dir,
        )
        .await?;

        let entry = scrape_entry_point(&log, ctx.output_dir)
            .or_else(|| probe_entry_point(ctx.output_dir, &entry_candidates(&artifact)))
            .ok_or_else(|| InstallerError::ExternalInstaller {
                installer: "NeoForge".into(),
                code: Some(0),
                log: format!("could not locate the server entry point\n{}", log),
            })?;

        info!("NeoForge {} installed, entry point {}", version, entry);
        Ok(LoaderInstallResult::single(entry))
    }
}
