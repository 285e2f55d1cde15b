use std::fs::File;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
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
use crate::core::modpack::curseforge::{read_cf_pack, CfModLookup};
use crate::core::modpack::PackIndex;

pub const CURSEFORGE_API: &str = "https://api.curseforge.com/v1";
const MINECRAFT_GAME_ID: &str = "432";
const MODPACK_CLASS_ID: &str = "4471";
const PAGE_SIZE: u32 = 50;
const SHA1_ALGO: u8 = 1;

// ── API models ──────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct CfResponse<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CfPage<T> {
    data: Vec<T>,
    pagination: CfPagination,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CfPagination {
    index: u32,
    result_count: u32,
    total_count: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CfMod {
    pub id: u64,
    pub slug: String,
    pub name: String,
    #[serde(default)]
    pub class_id: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CfFile {
    pub id: u64,
    pub mod_id: u64,
    #[serde(default)]
    pub display_name: String,
    pub file_name: String,
    /// 1 release, 2 beta, 3 alpha.
    pub release_type: u8,
    #[serde(default)]
    pub download_url: Option<String>,
    #[serde(default)]
    pub hashes: Vec<CfHash>,
    #[serde(default)]
    pub game_versions: Vec<String>,
    #[serde(default)]
    pub file_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CfHash {
    pub value: String,
    pub algo: u8,
}

impl CfFile {
    pub fn sha1(&self) -> Option<&str> {
        self.hashes
            .iter()
            .find(|h| h.algo == SHA1_ALGO)
            .map(|h| h.value.as_str())
    }

    pub fn version_type(&self) -> VersionType {
        match self.release_type {
            1 => VersionType::Release,
            2 => VersionType::Beta,
            _ => VersionType::Alpha,
        }
    }

    /// Files tagged for the client only.
    pub fn is_client_only(&self) -> bool {
        let has = |tag: &str| self.game_versions.iter().any(|v| v.eq_ignore_ascii_case(tag));
        has("Client") && !has("Server")
    }

    fn matches(&self, filters: &VersionFilters) -> bool {
        let tagged = |wanted: &[String]| {
            wanted.is_empty()
                || wanted
                    .iter()
                    .any(|w| self.game_versions.iter().any(|v| v.eq_ignore_ascii_case(w)))
        };
        tagged(&filters.game_versions) && tagged(&filters.loaders)
    }
}

impl From<CfFile> for PackageVersion {
    fn from(file: CfFile) -> Self {
        PackageVersion {
            project_id: file.mod_id.to_string(),
            version_id: file.id.to_string(),
            version_type: file.version_type(),
            version_number: if file.display_name.is_empty() {
                file.file_name.clone()
            } else {
                file.display_name.clone()
            },
            files: vec![VersionFile {
                url: file.download_url.clone(),
                sha1: file.sha1().map(str::to_string),
                file_name: file.file_name,
                primary: true,
            }],
            game_versions: file.game_versions,
            loaders: Vec::new(),
        }
    }
}

// ── Client ──────────────────────────────────────────────

/// CurseForge Core API client with cached lookups.
pub struct CurseForgeClient {
    fetcher: Arc<dyn Fetcher>,
    cache: ApiCache,
    api_key: String,
    base_url: String,
    concurrency: usize,
}

impl CurseForgeClient {
    pub fn new(
        fetcher: Arc<dyn Fetcher>,
        cache: ApiCache,
        api_key: Option<String>,
        concurrency: usize,
    ) -> InstallerResult<Self> {
        let api_key = api_key
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .ok_or_else(|| {
                InstallerError::InvalidParameter(
                    "a CurseForge API key is required (--api-key or CF_API_KEY)".into(),
                )
            })?;

        Ok(Self {
            fetcher,
            cache,
            api_key,
            base_url: CURSEFORGE_API.to_string(),
            concurrency: concurrency.max(1),
        })
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    async fn get<T: serde::de::DeserializeOwned>(&self, url: &str) -> InstallerResult<T> {
        fetch_json(self.fetcher.as_ref(), url, &[("x-api-key", self.api_key.as_str())]).await
    }

    async fn search_mod(&self, slug: &str) -> InstallerResult<CfMod> {
        self.cache
            .cache("searchMod", &[slug], || async {
                let url = search_url(&self.base_url, slug)?;
                let found: CfResponse<Vec<CfMod>> = self.get(&url).await?;
                found
                    .data
                    .into_iter()
                    .find(|m| m.slug == slug)
                    .ok_or_else(|| InstallerError::NotFound(format!("CurseForge modpack '{}'", slug)))
            })
            .await
    }

    async fn get_mod(&self, mod_id: u64) -> InstallerResult<CfMod> {
        let key = mod_id.to_string();
        self.cache
            .cache("getMod", &[key.as_str()], || async {
                let url = format!("{}/mods/{}", self.base_url, mod_id);
                let found: CfResponse<CfMod> = self
                    .get(&url)
                    .await
                    .map_err(not_found_as(format!("CurseForge project {}", mod_id)))?;
                Ok(found.data)
            })
            .await
    }

    async fn get_mod_files(&self, mod_id: u64) -> InstallerResult<Vec<CfFile>> {
        let key = mod_id.to_string();
        self.cache
            .cache("getModFiles", &[key.as_str()], || async {
                let mut files = Vec::new();
                let mut index = 0;
                loop {
                    let url = format!(
                        "{}/mods/{}/files?index={}&pageSize={}",
                        self.base_url, mod_id, index, PAGE_SIZE
                    );
                    let page: CfPage<CfFile> = self
                        .get(&url)
                        .await
                        .map_err(not_found_as(format!("CurseForge project {}", mod_id)))?;
                    let count = page.pagination.result_count;
                    files.extend(page.data);
                    index = page.pagination.index + count;
                    if count == 0 || index >= page.pagination.total_count {
                        break;
                    }
                }
                debug!("CurseForge project {} has {} files", mod_id, files.len());
                Ok(files)
            })
            .await
    }

    async fn get_mod_file(&self, mod_id: u64, file_id: u64) -> InstallerResult<CfFile> {
        let mod_key = mod_id.to_string();
        let file_key = file_id.to_string();
        self.cache
            .cache("getModFile", &[mod_key.as_str(), file_key.as_str()], || async {
                let url = format!("{}/mods/{}/files/{}", self.base_url, mod_id, file_id);
                let found: CfResponse<CfFile> = self.get(&url).await.map_err(not_found_as(
                    format!("file {} of CurseForge project {}", file_id, mod_id),
                ))?;
                Ok(found.data)
            })
            .await
    }

    /// Numeric ids are used directly, anything else is looked up as a slug.
    async fn resolve_mod(&self, id_or_slug: &str) -> InstallerResult<CfMod> {
        match id_or_slug.parse::<u64>() {
            Ok(id) => self.get_mod(id).await,
            Err(_) => self.search_mod(id_or_slug).await,
        }
    }
}

fn parse_file_id(raw: &str) -> InstallerResult<u64> {
    raw.parse().map_err(|_| {
        InstallerError::InvalidParameter(format!("CurseForge file id '{}' is not numeric", raw))
    })
}

fn search_url(base: &str, slug: &str) -> InstallerResult<String> {
    let url = reqwest::Url::parse_with_params(
        &format!("{}/mods/search", base),
        &[
            ("gameId", MINECRAFT_GAME_ID),
            ("classId", MODPACK_CLASS_ID),
            ("slug", slug),
        ],
    )
    .map_err(|e| InstallerError::InvalidParameter(format!("bad CurseForge URL: {}", e)))?;
    Ok(url.to_string())
}

#[async_trait]
impl CfModLookup for CurseForgeClient {
    async fn mod_info(&self, mod_id: u64) -> InstallerResult<CfMod> {
        self.get_mod(mod_id).await
    }

    async fn mod_file(&self, mod_id: u64, file_id: u64) -> InstallerResult<CfFile> {
        self.get_mod_file(mod_id, file_id).await
    }
}

#[async_trait]
impl VersionSource for CurseForgeClient {
    async fn list_versions(
        &self,
        id_or_slug: &str,
        filters: &VersionFilters,
    ) -> InstallerResult<Vec<PackageVersion>> {
        let project = self.resolve_mod(id_or_slug).await?;
        let files = self.get_mod_files(project.id).await?;
        Ok(files
            .into_iter()
            .filter(|f| f.matches(filters))
            .map(PackageVersion::from)
            .collect())
    }

    async fn get_version(
        &self,
        id_or_slug: &str,
        version_id: &str,
    ) -> InstallerResult<PackageVersion> {
        let file_id = parse_file_id(version_id)?;
        let project = self.resolve_mod(id_or_slug).await?;
        Ok(self.get_mod_file(project.id, file_id).await?.into())
    }

    fn is_version_id(&self, candidate: &str) -> bool {
        !candidate.is_empty() && candidate.chars().all(|c| c.is_ascii_digit())
    }
}

#[async_trait]
impl PackPlatform for CurseForgeClient {
    fn target_id(&self) -> &'static str {
        "curseforge"
    }

    fn manifest_kind(&self) -> ManifestKind {
        ManifestKind::CurseForgeModpack
    }

    async fn project(&self, id_or_slug: &str) -> InstallerResult<ProjectInfo> {
        let project = self.resolve_mod(id_or_slug).await?;
        Ok(ProjectInfo {
            id: project.id.to_string(),
            slug: project.slug,
            title: project.name,
        })
    }

    fn pack_artifact(&self, version: &PackageVersion) -> InstallerResult<PackArtifact> {
        let file = version.files.first().ok_or_else(|| {
            InstallerError::NotFound(format!("CurseForge file {}", version.version_id))
        })?;
        let url = file
            .url
            .clone()
            .ok_or_else(|| InstallerError::DistributionRestricted {
                name: file.file_name.clone(),
                file_id: version.version_id.parse().unwrap_or_default(),
            })?;

        Ok(PackArtifact {
            url,
            file_name: file.file_name.clone(),
            sha1: file.sha1.clone(),
        })
    }

    async fn read_pack(&self, archive: &mut PackArchive<File>) -> InstallerResult<PackIndex> {
        read_cf_pack(self, archive, self.concurrency).await
    }

    fn flush_cache(&self) {
        self.cache.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(id: u64, release_type: u8, game_versions: &[&str], date: &str) -> CfFile {
        CfFile {
            id,
            mod_id: 1,
            display_name: format!("Pack {}", id),
            file_name: format!("pack-{}.zip", id),
            release_type,
            download_url: Some(format!("https://edge.forgecdn.net/{}", id)),
            hashes: vec![CfHash {
                value: "abc".into(),
                algo: SHA1_ALGO,
            }],
            game_versions: game_versions.iter().map(|v| v.to_string()).collect(),
            file_date: Some(date.parse().unwrap()),
        }
    }

    #[test]
    fn release_types_map_to_tiers() {
        assert_eq!(file(1, 1, &[], "2024-01-01T00:00:00Z").version_type(), VersionType::Release);
        assert_eq!(file(1, 2, &[], "2024-01-01T00:00:00Z").version_type(), VersionType::Beta);
        assert_eq!(file(1, 3, &[], "2024-01-01T00:00:00Z").version_type(), VersionType::Alpha);
    }

    #[test]
    fn client_only_tagging() {
        assert!(file(1, 1, &["1.20.1", "Client"], "2024-01-01T00:00:00Z").is_client_only());
        assert!(!file(1, 1, &["1.20.1", "Client", "Server"], "2024-01-01T00:00:00Z").is_client_only());
        assert!(!file(1, 1, &["1.20.1"], "2024-01-01T00:00:00Z").is_client_only());
    }

    #[test]
    fn filters_match_game_version_and_loader_tags() {
        let f = file(1, 1, &["1.20.1", "Forge"], "2024-01-01T00:00:00Z");
        let filters = VersionFilters {
            loaders: vec!["forge".into()],
            game_versions: vec!["1.20.1".into()],
        };
        assert!(f.matches(&filters));
        assert!(!f.matches(&VersionFilters {
            game_versions: vec!["1.19.2".into()],
            ..VersionFilters::default()
        }));
    }

    #[test]
    fn search_url_encodes_slug() {
        let url = search_url(CURSEFORGE_API, "all the mods&x=1").unwrap();
        assert_eq!(
            url,
            "https://api.curseforge.com/v1/mods/search?gameId=432&classId=4471&slug=all+the+mods%26x%3D1"
        );
    }

    struct CannedApi(std::collections::HashMap<String, String>);

    #[async_trait]
    impl Fetcher for CannedApi {
        async fn get_bytes(&self, url: &str, _: &[(&str, &str)]) -> InstallerResult<Vec<u8>> {
            self.0
                .get(url)
                .map(|body| body.as_bytes().to_vec())
                .ok_or_else(|| InstallerError::HttpStatus {
                    url: url.to_string(),
                    status: 404,
                })
        }

        async fn download_file(
            &self,
            url: &str,
            _: &std::path::Path,
            _: &[(&str, &str)],
        ) -> InstallerResult<crate::core::downloader::DownloadOutcome> {
            Err(InstallerError::Other(format!("unexpected download {}", url)))
        }
    }

    #[tokio::test]
    async fn listing_keeps_upstream_order() {
        let base = "https://cf.test/v1";
        let files = serde_json::json!({
            "data": [
                file(1, 1, &[], "2023-01-01T00:00:00Z"),
                file(3, 2, &[], "2024-06-01T00:00:00Z"),
                file(2, 1, &[], "2024-01-01T00:00:00Z"),
            ],
            "pagination": {"index": 0, "resultCount": 3, "totalCount": 3}
        });
        let project = serde_json::json!({
            "data": {"id": 1, "slug": "pack", "name": "Pack", "classId": 4471}
        });
        let routes = [
            (format!("{}/mods/1", base), project.to_string()),
            (format!("{}/mods/1/files?index=0&pageSize=50", base), files.to_string()),
        ];
        let client = CurseForgeClient::new(
            Arc::new(CannedApi(routes.into_iter().collect())),
            ApiCache::Disabled,
            Some("key".into()),
            4,
        )
        .unwrap()
        .with_base_url(base);

        let versions = client
            .list_versions("1", &VersionFilters::default())
            .await
            .unwrap();
        let ids: Vec<_> = versions.iter().map(|v| v.version_id.as_str()).collect();
        assert_eq!(ids, vec!["1", "3", "2"]);
    }

    #[test]
    fn converts_file_to_package_version() {
        let version: PackageVersion = file(7, 1, &["1.20.1"], "2024-01-01T00:00:00Z").into();
        assert_eq!(version.version_id, "7");
        assert_eq!(version.project_id, "1");
        assert_eq!(version.files[0].sha1.as_deref(), Some("abc"));
    }

    #[test]
    fn missing_api_key_is_invalid_parameter() {
        struct NoNet;
        #[async_trait]
        impl Fetcher for NoNet {
            async fn get_bytes(&self, url: &str, _: &[(&str, &str)]) -> InstallerResult<Vec<u8>> {
                Err(InstallerError::Other(format!("unexpected request {}", url)))
            }
            async fn download_file(
                &self,
                url: &str,
                _: &std::path::Path,
                _: &[(&str, &str)],
            ) -> InstallerResult<crate::core::downloader::DownloadOutcome> {
                Err(InstallerError::Other(format!("unexpected request {}", url)))
            }
        }

        let result = CurseForgeClient::new(Arc::new(NoNet), ApiCache::Disabled, Some("  ".into()), 4);
        assert!(matches!(result, Err(InstallerError::InvalidParameter(_))));
    }
}
