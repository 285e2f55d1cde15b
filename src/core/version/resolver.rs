use std::path::Path;

use tracing::{debug, info};

use super::reference::VersionSpec;
use crate::core::error::{InstallerError, InstallerResult};
use crate::core::manifest::InstallManifest;
use crate::core::platforms::{PackageVersion, VersionFilters, VersionSource, VersionType};

/// Identity fields recorded in a pack manifest.
pub const PROJECT_ID: &str = "projectId";
pub const PROJECT_SLUG: &str = "projectSlug";
pub const VERSION_ID: &str = "versionId";

/// What to resolve, and against which listing filters.
#[derive(Debug, Clone)]
pub struct VersionRequest {
    pub id_or_slug: String,
    pub spec: VersionSpec,
    pub filters: VersionFilters,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveOutcome {
    /// The resolved version must be installed.
    Install(PackageVersion),
    /// The previous run already installed it and its files are intact.
    UpToDate(PackageVersion),
}

impl ResolveOutcome {
    pub fn version(&self) -> &PackageVersion {
        match self {
            ResolveOutcome::Install(v) | ResolveOutcome::UpToDate(v) => v,
        }
    }
}

/// Resolve `request` to a concrete version and decide whether installing it
/// is needed given the `previous` manifest.
pub async fn resolve(
    source: &dyn VersionSource,
    request: &VersionRequest,
    previous: Option<&InstallManifest>,
    output_dir: &Path,
    force_synchronize: bool,
) -> InstallerResult<ResolveOutcome> {
    let version = pick_version(source, request).await?;
    info!(
        "Resolved {} to version {} ({}, {})",
        request.id_or_slug, version.version_number, version.version_id, version.version_type
    );

    if force_synchronize {
        return Ok(ResolveOutcome::Install(version));
    }

    let up_to_date = previous.is_some_and(|m| {
        m.field(PROJECT_ID) == Some(version.project_id.as_str())
            && m.field(VERSION_ID) == Some(version.version_id.as_str())
            && m.all_files_present(output_dir)
    });
    if up_to_date {
        Ok(ResolveOutcome::UpToDate(version))
    } else {
        Ok(ResolveOutcome::Install(version))
    }
}

async fn pick_version(
    source: &dyn VersionSource,
    request: &VersionRequest,
) -> InstallerResult<PackageVersion> {
    match &request.spec {
        VersionSpec::Explicit(wanted) if source.is_version_id(wanted) => {
            match source.get_version(&request.id_or_slug, wanted).await {
                Ok(version) => Ok(version),
                // Version numbers can have the shape of an id too.
                Err(InstallerError::NotFound(what)) => {
                    debug!("No version with id {}, trying it as a version number", wanted);
                    find_by_number(source, request, wanted)
                        .await?
                        .ok_or(InstallerError::NotFound(what))
                }
                Err(e) => Err(e),
            }
        }
        VersionSpec::Explicit(wanted) => find_by_number(source, request, wanted)
            .await?
            .ok_or_else(|| {
                InstallerError::NotFound(format!(
                    "version '{}' of {}",
                    wanted, request.id_or_slug
                ))
            }),
        VersionSpec::Latest(tier) => {
            let versions = source
                .list_versions(&request.id_or_slug, &request.filters)
                .await?;
            select_latest(versions, *tier).ok_or_else(|| {
                InstallerError::NoApplicableVersion(format!(
                    "no {} version of {} matches loaders {:?} and game versions {:?}",
                    tier, request.id_or_slug, request.filters.loaders, request.filters.game_versions
                ))
            })
        }
    }
}

async fn find_by_number(
    source: &dyn VersionSource,
    request: &VersionRequest,
    wanted: &str,
) -> InstallerResult<Option<PackageVersion>> {
    let versions = source
        .list_versions(&request.id_or_slug, &request.filters)
        .await?;
    Ok(versions
        .into_iter()
        .find(|v| v.version_number == wanted || v.version_id == wanted))
}

/// First version, in listed order, at least as stable as `tier`.
pub fn select_latest(
    versions: impl IntoIterator<Item = PackageVersion>,
    tier: VersionType,
) -> Option<PackageVersion> {
    versions
        .into_iter()
        .find(|v| v.version_type.satisfies(tier))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::core::manifest::ManifestKind;

    struct FakeSource {
        versions: Vec<PackageVersion>,
        listings: AtomicUsize,
    }

    impl FakeSource {
        fn new(versions: &[(&str, VersionType)]) -> Self {
            Self {
                versions: versions
                    .iter()
                    .map(|(id, version_type)| PackageVersion {
                        project_id: "P1".into(),
                        version_id: id.to_string(),
                        version_number: format!("{}.0", id),
                        version_type: *version_type,
                        game_versions: vec!["1.20.1".into()],
                        loaders: vec!["fabric".into()],
                        files: Vec::new(),
                    })
                    .collect(),
                listings: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl VersionSource for FakeSource {
        async fn list_versions(
            &self,
            id_or_slug: &str,
            _filters: &VersionFilters,
        ) -> InstallerResult<Vec<PackageVersion>> {
            self.listings.fetch_add(1, Ordering::SeqCst);
            if id_or_slug != "terralith" {
                return Err(InstallerError::NotFound(id_or_slug.to_string()));
            }
            Ok(self.versions.clone())
        }

        async fn get_version(&self, _: &str, version_id: &str) -> InstallerResult<PackageVersion> {
            self.versions
                .iter()
                .find(|v| v.version_id == version_id)
                .cloned()
                .ok_or_else(|| InstallerError::NotFound(version_id.to_string()))
        }

        fn is_version_id(&self, candidate: &str) -> bool {
            candidate.starts_with('v') && !candidate.contains('.')
        }
    }

    fn request(spec: VersionSpec) -> VersionRequest {
        VersionRequest {
            id_or_slug: "terralith".into(),
            spec,
            filters: VersionFilters::default(),
        }
    }

    fn terralith() -> FakeSource {
        FakeSource::new(&[
            ("v3", VersionType::Beta),
            ("v2", VersionType::Release),
            ("v1", VersionType::Release),
        ])
    }

    #[tokio::test]
    async fn release_tier_skips_newer_beta() {
        let dir = tempfile::tempdir().unwrap();
        let outcome = resolve(
            &terralith(),
            &request(VersionSpec::Latest(VersionType::Release)),
            None,
            dir.path(),
            false,
        )
        .await
        .unwrap();
        assert_eq!(outcome, ResolveOutcome::Install(terralith().versions[1].clone()));
        assert_eq!(outcome.version().version_id, "v2");
    }

    #[tokio::test]
    async fn beta_tier_takes_first_listed() {
        let dir = tempfile::tempdir().unwrap();
        let outcome = resolve(
            &terralith(),
            &request(VersionSpec::Latest(VersionType::Beta)),
            None,
            dir.path(),
            false,
        )
        .await
        .unwrap();
        assert_eq!(outcome.version().version_id, "v3");
    }

    #[tokio::test]
    async fn nothing_stable_enough_is_no_applicable_version() {
        let dir = tempfile::tempdir().unwrap();
        let source = FakeSource::new(&[("v9", VersionType::Alpha)]);
        let err = resolve(
            &source,
            &request(VersionSpec::Latest(VersionType::Beta)),
            None,
            dir.path(),
            false,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, InstallerError::NoApplicableVersion(_)));
    }

    #[tokio::test]
    async fn explicit_id_and_number() {
        let dir = tempfile::tempdir().unwrap();
        let source = terralith();

        let by_id = resolve(&source, &request(VersionSpec::Explicit("v1".into())), None, dir.path(), false)
            .await
            .unwrap();
        assert_eq!(by_id.version().version_id, "v1");
        assert_eq!(source.listings.load(Ordering::SeqCst), 0);

        let by_number = resolve(&source, &request(VersionSpec::Explicit("v3.0".into())), None, dir.path(), false)
            .await
            .unwrap();
        assert_eq!(by_number.version().version_id, "v3");

        let missing = resolve(&source, &request(VersionSpec::Explicit("v7".into())), None, dir.path(), false)
            .await
            .unwrap_err();
        assert!(matches!(missing, InstallerError::NotFound(_)));
    }

    #[tokio::test]
    async fn unknown_project_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let mut req = request(VersionSpec::Latest(VersionType::Release));
        req.id_or_slug = "nope".into();
        let err = resolve(&terralith(), &req, None, dir.path(), false)
            .await
            .unwrap_err();
        assert!(matches!(err, InstallerError::NotFound(_)));
    }

    #[tokio::test]
    async fn same_version_with_files_present_is_up_to_date() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("mods")).unwrap();
        std::fs::write(dir.path().join("mods/a.jar"), b"a").unwrap();

        let previous = InstallManifest::new(ManifestKind::ModrinthModpack)
            .with_files(["mods/a.jar".to_string()])
            .with_field(PROJECT_ID, "P1")
            .with_field(VERSION_ID, "v2");
        let req = request(VersionSpec::Latest(VersionType::Release));

        let outcome = resolve(&terralith(), &req, Some(&previous), dir.path(), false)
            .await
            .unwrap();
        assert!(matches!(outcome, ResolveOutcome::UpToDate(_)));

        let forced = resolve(&terralith(), &req, Some(&previous), dir.path(), true)
            .await
            .unwrap();
        assert!(matches!(forced, ResolveOutcome::Install(_)));

        std::fs::remove_file(dir.path().join("mods/a.jar")).unwrap();
        let damaged = resolve(&terralith(), &req, Some(&previous), dir.path(), false)
            .await
            .unwrap();
        assert!(matches!(damaged, ResolveOutcome::Install(_)));
    }
}
