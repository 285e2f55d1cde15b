//! Upstream package platforms.

pub mod curseforge;
pub mod modrinth;

use std::fmt;
use std::fs::File;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::archive::PackArchive;
use crate::core::error::{InstallerError, InstallerResult};
use crate::core::manifest::ManifestKind;
use crate::core::modpack::PackIndex;

/// Stability tier. Ordered so that `Release > Beta > Alpha`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VersionType {
    Alpha,
    Beta,
    Release,
}

impl VersionType {
    /// Whether a version of this type may be picked when `requested` is asked for.
    pub fn satisfies(self, requested: VersionType) -> bool {
        self >= requested
    }
}

impl FromStr for VersionType {
    type Err = InstallerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "release" => Ok(VersionType::Release),
            "beta" => Ok(VersionType::Beta),
            "alpha" => Ok(VersionType::Alpha),
            other => Err(InstallerError::InvalidParameter(format!(
                "unknown version type '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for VersionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            VersionType::Release => "release",
            VersionType::Beta => "beta",
            VersionType::Alpha => "alpha",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectInfo {
    pub id: String,
    pub slug: String,
    pub title: String,
}

/// A downloadable file attached to a version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionFile {
    /// Absent when the author forbids third-party downloads.
    pub url: Option<String>,
    pub file_name: String,
    pub sha1: Option<String>,
    pub primary: bool,
}

/// One upstream release of a package, normalized across platforms.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageVersion {
    pub project_id: String,
    pub version_id: String,
    pub version_number: String,
    pub version_type: VersionType,
    #[serde(default)]
    pub game_versions: Vec<String>,
    #[serde(default)]
    pub loaders: Vec<String>,
    #[serde(default)]
    pub files: Vec<VersionFile>,
}

/// Listing filters; empty means unfiltered.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionFilters {
    pub loaders: Vec<String>,
    pub game_versions: Vec<String>,
}

/// Version lookups consumed by the version resolver.
#[async_trait]
pub trait VersionSource: Send + Sync {
    /// Upstream versions of a package, newest first.
    async fn list_versions(
        &self,
        id_or_slug: &str,
        filters: &VersionFilters,
    ) -> InstallerResult<Vec<PackageVersion>>;

    async fn get_version(&self, id_or_slug: &str, version_id: &str)
        -> InstallerResult<PackageVersion>;

    /// Whether `candidate` has the shape of a platform version id rather
    /// than a version number.
    fn is_version_id(&self, candidate: &str) -> bool;
}

/// Where to fetch a pack archive from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackArtifact {
    pub url: String,
    pub file_name: String,
    pub sha1: Option<String>,
}

/// A platform that distributes whole modpacks.
#[async_trait]
pub trait PackPlatform: VersionSource {
    /// Manifest target id, e.g. `modrinth-modpack`.
    fn target_id(&self) -> &'static str;

    fn manifest_kind(&self) -> ManifestKind;

    async fn project(&self, id_or_slug: &str) -> InstallerResult<ProjectInfo>;

    fn pack_artifact(&self, version: &PackageVersion) -> InstallerResult<PackArtifact>;

    /// Read the pack's file list and loader requirements.
    async fn read_pack(&self, archive: &mut PackArchive<File>) -> InstallerResult<PackIndex>;

    /// Persist cached upstream answers.
    fn flush_cache(&self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stability_order() {
        assert!(VersionType::Release.satisfies(VersionType::Beta));
        assert!(VersionType::Beta.satisfies(VersionType::Beta));
        assert!(!VersionType::Alpha.satisfies(VersionType::Beta));
        assert!(!VersionType::Beta.satisfies(VersionType::Release));
    }

    #[test]
    fn parses_version_types() {
        assert_eq!("Release".parse::<VersionType>().unwrap(), VersionType::Release);
        assert!("stable".parse::<VersionType>().is_err());
    }
}
