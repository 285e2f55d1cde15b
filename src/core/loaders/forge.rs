use std::collections::HashMap;

use serde::Deserialize;
use tracing::info;

use super::context::InstallContext;
use super::installer::{is_alias, LoaderInstallResult, LoaderInstaller};
use super::scrape::{probe_entry_point, scrape_entry_point};
use crate::core::downloader::{fetch_json, Fetcher};
use crate::core::error::{InstallerError, InstallerResult};
use crate::core::java::run_java_jar;
use crate::core::maven::{MavenArtifact, FORGE_MAVEN};

const PROMOTIONS_URL: &str =
    "https://files.minecraftforge.net/net/minecraftforge/forge/promotions_slim.json";

/// Installs a Forge server by running the official installer jar.
pub struct ForgeInstaller;

#[derive(Debug, Deserialize)]
struct Promotions {
    #[serde(default)]
    promos: HashMap<String, String>,
}

/// `recommended` falls back to `latest` when a Minecraft version has no
/// recommended build.
fn pick_promotion(
    promos: &HashMap<String, String>,
    minecraft_version: &str,
    alias: &str,
) -> InstallerResult<String> {
    let latest = format!("{}-latest", minecraft_version);
    let recommended = format!("{}-recommended", minecraft_version);

    let found = if alias.eq_ignore_ascii_case("recommended") {
        promos.get(&recommended).or_else(|| promos.get(&latest))
    } else {
        promos.get(&latest)
    };

    found.cloned().ok_or_else(|| {
        InstallerError::NoApplicableVersion(format!(
            "no Forge build promoted for Minecraft {}",
            minecraft_version
        ))
    })
}

/// Version qualifiers used by Forge over time, tried in order.
fn qualifiers(minecraft_version: &str, forge_version: &str) -> Vec<String> {
    vec![
        format!("{}-{}", minecraft_version, forge_version),
        format!("{}-{}-{}", minecraft_version, forge_version, minecraft_version),
        format!(
            "{}-{}-mc{}",
            minecraft_version,
            forge_version,
            minecraft_version.replace('.', "")
        ),
    ]
}

fn entry_candidates(qualifier: &str) -> Vec<String> {
    vec![
        format!("forge-{}-shim.jar", qualifier),
        format!("forge-{}.jar", qualifier),
        format!("forge-{}-universal.jar", qualifier),
        format!(
            "libraries/net/minecraftforge/forge/{}/unix_args.txt",
            qualifier
        ),
    ]
}

#[async_trait::async_trait]
impl LoaderInstaller for ForgeInstaller {
    async fn resolve_version(
        &self,
        fetcher: &dyn Fetcher,
        minecraft_version: &str,
        requested: &str,
    ) -> InstallerResult<String> {
        if !is_alias(requested, &["latest", "recommended"]) {
            return Ok(requested.trim().to_string());
        }

        let promotions: Promotions = fetch_json(fetcher, PROMOTIONS_URL, &[]).await?;
        let alias = if requested.trim().is_empty() {
            "recommended"
        } else {
            requested.trim()
        };
        let version = pick_promotion(&promotions.promos, minecraft_version, alias)?;
        info!(
            "Resolved Forge {} for Minecraft {} to {}",
            alias, minecraft_version, version
        );
        Ok(version)
    }

    async fn install(&self, ctx: InstallContext<'_>) -> InstallerResult<LoaderInstallResult> {
        info!(
            "Installing Forge {} for MC {}",
            ctx.loader_version, ctx.minecraft_version
        );

        let candidates: Vec<MavenArtifact> = qualifiers(ctx.minecraft_version, ctx.loader_version)
            .iter()
            .map(|q| MavenArtifact::new("net.minecraftforge", "forge", q).with_classifier("installer"))
            .collect();
        let (installer_path, artifact) = ctx.fetch_installer(FORGE_MAVEN, &candidates).await?;

        let log = run_java_jar(
            "Forge",
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
            .or_else(|| probe_entry_point(ctx.output_dir, &entry_candidates(&artifact.version)))
            .ok_or_else(|| InstallerError::ExternalInstaller {
                installer: "Forge".into(),
                code: Some(0),
                log: format!("could not locate the server entry point\n{}", log),
            })?;

        info!("Forge {} installed, entry point {}", artifact.version, entry);
        Ok(LoaderInstallResult::single(entry))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn promos(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn recommended_falls_back_to_latest() {
        let p = promos(&[("1.20.4-latest", "49.0.30")]);
        assert_eq!(pick_promotion(&p, "1.20.4", "recommended").unwrap(), "49.0.30");
    }

    #[test]
    fn latest_ignores_recommended() {
        let p = promos(&[("1.20.1-latest", "47.2.20"), ("1.20.1-recommended", "47.2.0")]);
        assert_eq!(pick_promotion(&p, "1.20.1", "latest").unwrap(), "47.2.20");
        assert_eq!(pick_promotion(&p, "1.20.1", "recommended").unwrap(), "47.2.0");
    }

    #[test]
    fn unknown_minecraft_version_has_no_applicable_build() {
        assert!(matches!(
            pick_promotion(&promos(&[]), "1.99", "latest"),
            Err(InstallerError::NoApplicableVersion(_))
        ));
    }

    #[test]
    fn qualifier_fallbacks_cover_legacy_layouts() {
        assert_eq!(
            qualifiers("1.7.10", "10.13.4.1614"),
            vec![
                "1.7.10-10.13.4.1614",
                "1.7.10-10.13.4.1614-1.7.10",
                "1.7.10-10.13.4.1614-mc1710",
            ]
        );
    }
}
