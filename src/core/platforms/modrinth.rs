use std::collections::BTreeMap;
use std::fs::File;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{
    PackArtifact, PackPlatform, PackageVersion, ProjectInfo, VersionFile, VersionFilters,
    VersionSource, VersionType,
};
use crate::core::archive::PackArchive;
use crate::core::cache::ApiCache;
use crate::core::downloader::{fetch_json, not_found_as, Fetcher};
use crate::core::error::{InstallerError, InstallerResult};
use crate::core::manifest::ManifestKind;
use crate::core::modpack::modrinth::read_mrpack;
use crate::core::modpack::PackIndex;

pub const MODRINTH_API: &str = "https://api.modrinth.com/v2";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModrinthProject {
    pub id: String,
    pub slug: String,
    pub title: String,
    #[serde(default)]
    pub project_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModrinthVersion {
    pub id: String,
    pub project_id: String,
    #[serde(default)]
    pub name: String,
    pub version_number: String,
    pub version_type: VersionType,
    #[serde(default)]
    pub game_versions: Vec<String>,
    #[serde(default)]
    pub loaders: Vec<String>,
    #[serde(default)]
    pub files: Vec<ModrinthFile>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModrinthFile {
    pub url: String,
    pub filename: String,
    #[serde(default)]
    pub primary: bool,
    #[serde(default)]
    pub hashes: BTreeMap<String, String>,
}

impl From<ModrinthVersion> for PackageVersion {
    fn from(v: ModrinthVersion) -> Self {
        PackageVersion {
            project_id: v.project_id,
            version_id: v.id,
            version_number: v.version_number,
            version_type: v.version_type,
            game_versions: v.game_versions,
            loaders: v.loaders,
            files: v
                .files
                .into_iter()
                .map(|f| VersionFile {
                    sha1: f.hashes.get("sha1").cloned(),
                    url: Some(f.url),
                    file_name: f.filename,
                    primary: f.primary,
                })
                .collect(),
        }
    }
}

/// Modrinth API v2 client with cached lookups.
pub struct ModrinthClient {
    fetcher: Arc<dyn Fetcher>,
    cache: ApiCache,
    base_url: String,
}

impl ModrinthClient {
    pub fn new(fetcher: Arc<dyn Fetcher>, cache: ApiCache) -> Self {
        Self {
            fetcher,
            cache,
            base_url: MODRINTH_API.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    async fn get_project(&self, id_or_slug: &str) -> InstallerResult<ModrinthProject> {
        self.cache
            .cache("getProject", &[id_or_slug], || async {
                let url = format!("{}/project/{}", self.base_url, id_or_slug);
                fetch_json(self.fetcher.as_ref(), &url, &[])
                    .await
                    .map_err(not_found_as(format!("Modrinth project '{}'", id_or_slug)))
            })
            .await
    }

    async fn get_project_versions(
        &self,
        id_or_slug: &str,
        filters: &VersionFilters,
    ) -> InstallerResult<Vec<ModrinthVersion>> {
        let loaders = filters.loaders.join("|");
        let game_versions = filters.game_versions.join("|");

        self.cache
            .cache(
                "getProjectVersions",
                &[id_or_slug, loaders.as_str(), game_versions.as_str()],
                || async {
                    let url = versions_url(&self.base_url, id_or_slug, filters)?;
                    debug!("Listing Modrinth versions: {}", url);
                    fetch_json(self.fetcher.as_ref(), &url, &[])
                        .await
                        .map_err(not_found_as(format!("Modrinth project '{}'", id_or_slug)))
                },
            )
            .await
    }

    async fn get_version_by_id(&self, version_id: &str) -> InstallerResult<ModrinthVersion> {
        self.cache
            .cache("getVersion", &[version_id], || async {
                let url = format!("{}/version/{}", self.base_url, version_id);
                fetch_json(self.fetcher.as_ref(), &url, &[])
                    .await
                    .map_err(not_found_as(format!("Modrinth version '{}'", version_id)))
            })
            .await
    }
}

fn versions_url(base: &str, id_or_slug: &str, filters: &VersionFilters) -> InstallerResult<String> {
    let mut params = Vec::new();
    if !filters.loaders.is_empty() {
        params.push(("loaders", serde_json::to_string(&filters.loaders)?));
    }
    if !filters.game_versions.is_empty() {
        params.push(("game_versions", serde_json::to_string(&filters.game_versions)?));
    }

    let endpoint = format!("{}/project/{}/version", base, id_or_slug);
    if params.is_empty() {
        return Ok(endpoint);
    }

    let url = reqwest::Url::parse_with_params(&endpoint, &params)
        .map_err(|e| InstallerError::InvalidParameter(format!("bad Modrinth URL: {}", e)))?;
    Ok(url.to_string())
}

/// The primary `.mrpack` file of a version, else the first `.mrpack` listed.
fn mrpack_artifact(version: &PackageVersion) -> InstallerResult<PackArtifact> {
    let missing = || {
        InstallerError::NotFound(format!(
            "mrpack file in Modrinth version {}",
            version.version_id
        ))
    };
    let file = version
        .files
        .iter()
        .find(|f| f.primary && f.file_name.ends_with(".mrpack"))
        .or_else(|| version.files.iter().find(|f| f.file_name.ends_with(".mrpack")))
        .ok_or_else(missing)?;

    Ok(PackArtifact {
        url: file.url.clone().ok_or_else(missing)?,
        file_name: file.file_name.clone(),
        sha1: file.sha1.clone(),
    })
}

/// Modrinth ids are 8 base62 characters.
fn looks_like_version_id(candidate: &str) -> bool {
    candidate.len() == 8 && candidate.chars().all(|c| c.is_ascii_alphanumeric())
}

#[async_trait]
impl VersionSource for ModrinthClient {
    async fn list_versions(
        &self,
        id_or_slug: &str,
        filters: &VersionFilters,
    ) -> InstallerResult<Vec<PackageVersion>> {
        let versions = self.get_project_versions(id_or_slug, filters).await?;
        Ok(versions.into_iter().map(PackageVersion::from).collect())
    }

    async fn get_version(
        &self,
        id_or_slug: &str,
        version_id: &str,
    ) -> InstallerResult<PackageVersion> {
        let version = self.get_version_by_id(version_id).await?;
        let project = self.get_project(id_or_slug).await?;
        if version.project_id != project.id {
            return Err(InstallerError::NotFound(format!(
                "version '{}' of Modrinth project '{}'",
                version_id, id_or_slug
            )));
        }
        Ok(version.into())
    }

    fn is_version_id(&self, candidate: &str) -> bool {
        looks_like_version_id(candidate)
    }
}

#[async_trait]
impl PackPlatform for ModrinthClient {
    fn target_id(&self) -> &'static str {
        "modrinth-modpack"
    }

    fn manifest_kind(&self) -> ManifestKind {
        ManifestKind::ModrinthModpack
    }

    async fn project(&self, id_or_slug: &str) -> InstallerResult<ProjectInfo> {
        let project = self.get_project(id_or_slug).await?;
        Ok(ProjectInfo {
            id: project.id,
            slug: project.slug,
            title: project.title,
        })
    }

    fn pack_artifact(&self, version: &PackageVersion) -> InstallerResult<PackArtifact> {
        mrpack_artifact(version)
    }

    async fn read_pack(&self, archive: &mut PackArchive<File>) -> InstallerResult<PackIndex> {
        read_mrpack(archive)
    }

    fn flush_cache(&self) {
        self.cache.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_listing_url_encodes_filters() {
        let filters = VersionFilters {
            loaders: vec!["fabric".into()],
            game_versions: vec!["1.20.1".into()],
        };
        let url = versions_url(MODRINTH_API, "terralith", &filters).unwrap();
        assert!(url.starts_with("https://api.modrinth.com/v2/project/terralith/version?"));
        assert!(url.contains("loaders=%5B%22fabric%22%5D"));
        assert!(url.contains("game_versions=%5B%221.20.1%22%5D"));

        let bare = versions_url(MODRINTH_API, "terralith", &VersionFilters::default()).unwrap();
        assert_eq!(bare, "https://api.modrinth.com/v2/project/terralith/version");
    }

    #[test]
    fn version_id_shape() {
        assert!(looks_like_version_id("IZskON6d"));
        assert!(!looks_like_version_id("1.4.1"));
        assert!(!looks_like_version_id("latest"));
    }

    #[test]
    fn converts_upstream_version() {
        let json = r#"{
            "id": "IZskON6d", "project_id": "8oi3bsk5", "name": "Terralith 2.5",
            "version_number": "2.5.0", "version_type": "release",
            "game_versions": ["1.20.1"], "loaders": ["fabric"],
            "files": [{"url": "https://cdn/x.mrpack", "filename": "x.mrpack", "primary": true,
                       "hashes": {"sha1": "abc"}}]
        }"#;
        let version: PackageVersion = serde_json::from_str::<ModrinthVersion>(json).unwrap().into();
        assert_eq!(version.version_id, "IZskON6d");
        assert_eq!(version.version_type, VersionType::Release);
        assert_eq!(version.files[0].sha1.as_deref(), Some("abc"));
    }

    fn version_with(files: Vec<VersionFile>) -> PackageVersion {
        PackageVersion {
            project_id: "8oi3bsk5".into(),
            version_id: "IZskON6d".into(),
            version_number: "2.5.0".into(),
            version_type: VersionType::Release,
            game_versions: vec![],
            loaders: vec![],
            files,
        }
    }

    #[test]
    fn picks_primary_mrpack() {
        let version = version_with(vec![
            VersionFile {
                url: Some("https://cdn/other.mrpack".into()),
                file_name: "other.mrpack".into(),
                sha1: None,
                primary: false,
            },
            VersionFile {
                url: Some("https://cdn/main.mrpack".into()),
                file_name: "main.mrpack".into(),
                sha1: Some("abc".into()),
                primary: true,
            },
        ]);
        let artifact = mrpack_artifact(&version).unwrap();
        assert_eq!(artifact.url, "https://cdn/main.mrpack");
        assert_eq!(artifact.sha1.as_deref(), Some("abc"));
    }

    #[test]
    fn mrpack_without_url_is_not_found() {
        let version = version_with(vec![VersionFile {
            url: None,
            file_name: "main.mrpack".into(),
            sha1: None,
            primary: true,
        }]);
        let err = mrpack_artifact(&version).unwrap_err();
        assert!(matches!(err, InstallerError::NotFound(_)));
        assert_eq!(err.exit_code(), 40);
    }
}
