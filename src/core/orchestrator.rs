//! Modpack installation pipeline.
//!
//! resolve → fetch → filter → download → overrides → loader → reconcile.
//! Each stage consumes the full output of the previous one; only the file
//! download stage fans out.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::core::archive::PackArchive;
use crate::core::downloader::{sha1_hex, DownloadEntry, DownloadPool, Fetcher};
use crate::core::error::{InstallerError, InstallerResult};
use crate::core::filter::{ExcludeIncludeRules, FileInclusionCalculator, InclusionDecision};
use crate::core::loaders::{install_loader, LoaderOutcome};
use crate::core::manifest::{reconcile, InstallManifest, ReconcileReport};
use crate::core::modpack::PackIndex;
use crate::core::overrides::{apply_overrides, OverridesOptions, OverridesOutcome};
use crate::core::platforms::{PackPlatform, PackageVersion, ProjectInfo, VersionFilters, VersionType};
use crate::core::results::ResultsFile;
use crate::core::version::{
    resolve, PackageRef, ResolveOutcome, VersionRequest, VersionSpec, PROJECT_ID, PROJECT_SLUG,
    VERSION_ID,
};

const VERSION_NUMBER: &str = "versionNumber";
const MINECRAFT_VERSION: &str = "minecraftVersion";
const LOADER_TYPE: &str = "loaderType";
const SERVER_ENTRY: &str = "serverEntry";
const FAMILY: &str = "family";
const LEVEL: &str = "level";

/// Everything one pack install needs besides the platform.
#[derive(Debug, Clone)]
pub struct PackInstallOptions {
    pub reference: PackageRef,
    /// Version id, number, tier or `latest`; a version inside `reference` wins.
    pub version: Option<String>,
    pub default_version_type: VersionType,
    pub filters: VersionFilters,
    pub rules: ExcludeIncludeRules,
    pub overrides: OverridesOptions,
    pub force_synchronize: bool,
    pub force_loader_reinstall: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallSummary {
    UpToDate {
        version: PackageVersion,
    },
    Installed {
        version: PackageVersion,
        files: usize,
        cleanup: ReconcileReport,
        loader: Option<LoaderOutcome>,
    },
}

/// Output of the fetch and read stages.
struct FetchedPack {
    index: PackIndex,
    archive: PackArchive<std::fs::File>,
    // Keeps the downloaded archive alive until the pipeline is done with it.
    _work_dir: tempfile::TempDir,
}

pub struct InstallationOrchestrator<'a, P: PackPlatform> {
    platform: &'a P,
    fetcher: &'a dyn Fetcher,
    output_dir: &'a Path,
    results: &'a ResultsFile,
    concurrency: usize,
}

impl<'a, P: PackPlatform> InstallationOrchestrator<'a, P> {
    pub fn new(
        platform: &'a P,
        fetcher: &'a dyn Fetcher,
        output_dir: &'a Path,
        results: &'a ResultsFile,
        concurrency: usize,
    ) -> Self {
        Self {
            platform,
            fetcher,
            output_dir,
            results,
            concurrency,
        }
    }

    /// Run the pipeline. Nothing is committed to the pack manifest unless
    /// every stage before reconciliation succeeded.
    pub async fn install(&self, options: &PackInstallOptions) -> InstallerResult<InstallSummary> {
        let summary = self.run(options).await;
        self.platform.flush_cache();
        summary
    }

    async fn run(&self, options: &PackInstallOptions) -> InstallerResult<InstallSummary> {
        let target = self.platform.target_id();
        let previous = InstallManifest::load(self.output_dir, target).await?;

        let request = VersionRequest {
            id_or_slug: options.reference.id_or_slug.clone(),
            spec: VersionSpec::parse(
                options.reference.version_or(options.version.as_deref()),
                options.default_version_type,
            ),
            filters: options.filters.clone(),
        };
        let outcome = resolve(
            self.platform,
            &request,
            previous.as_ref(),
            self.output_dir,
            options.force_synchronize,
        )
        .await?;

        match outcome {
            ResolveOutcome::UpToDate(version) => {
                info!(
                    "{} {} is already installed, nothing to do",
                    options.reference.id_or_slug, version.version_number
                );
                if let Some(previous) = &previous {
                    self.report_recorded(previous).await?;
                }
                Ok(InstallSummary::UpToDate { version })
            }
            ResolveOutcome::Install(version) => {
                self.install_version(options, version, previous.as_ref()).await
            }
        }
    }

    async fn install_version(
        &self,
        options: &PackInstallOptions,
        version: PackageVersion,
        previous: Option<&InstallManifest>,
    ) -> InstallerResult<InstallSummary> {
        let project = self.platform.project(&options.reference.id_or_slug).await?;
        info!(
            "Installing {} ({}) version {}",
            project.title, project.slug, version.version_number
        );

        let fetched = self.fetch_pack(&version).await?;
        let downloads = select_files(&fetched.index, &options.rules, &project.slug)?;
        let mut files = self.download_files(downloads).await?;

        let overrides = extract_overrides(
            fetched.archive,
            fetched.index.overrides_roots.clone(),
            self.output_dir.to_path_buf(),
            options.overrides.clone(),
        )
        .await?;
        files.extend(overrides.installed);
        let level = overrides.level;

        let loader = install_loader(
            &fetched.index.loader,
            self.output_dir,
            self.fetcher,
            self.results,
            options.force_loader_reinstall,
        )
        .await?;

        let manifest = self.pack_manifest(
            &project,
            &version,
            &fetched.index,
            loader.as_ref(),
            level.as_deref(),
            files,
        );
        let file_count = manifest.files.len();
        let cleanup =
            reconcile(self.output_dir, self.platform.target_id(), previous, &manifest).await?;
        self.report_recorded(&manifest).await?;

        info!(
            "Installed {} {}: {} tracked file(s), {} removed",
            project.slug,
            version.version_number,
            file_count,
            cleanup.removed.len()
        );
        Ok(InstallSummary::Installed {
            version,
            files: file_count,
            cleanup,
            loader,
        })
    }

    /// Download the pack archive into a scratch directory and read its index.
    async fn fetch_pack(&self, version: &PackageVersion) -> InstallerResult<FetchedPack> {
        let artifact = self.platform.pack_artifact(version)?;
        let work_dir =
            tempfile::tempdir().map_err(|e| InstallerError::io(std::env::temp_dir(), e))?;
        let file_name = Path::new(&artifact.file_name)
            .file_name()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("pack.zip"));
        let path = work_dir.path().join(file_name);

        info!("Downloading pack archive {}", artifact.url);
        self.fetcher.download_file(&artifact.url, &path, &[]).await?;
        if let Some(expected) = &artifact.sha1 {
            let actual = sha1_hex(&path).await?;
            if !actual.eq_ignore_ascii_case(expected) {
                return Err(InstallerError::Sha1Mismatch {
                    path,
                    expected: expected.clone(),
                    actual,
                });
            }
        }

        let mut archive = PackArchive::open(&path)?;
        let index = self.platform.read_pack(&mut archive).await?;
        info!(
            "Pack '{}' lists {} file(s) for Minecraft {} ({})",
            index.name,
            index.files.len(),
            index.loader.minecraft_version,
            index.loader.type_name()
        );

        Ok(FetchedPack {
            index,
            archive,
            _work_dir: work_dir,
        })
    }

    async fn download_files(&self, entries: Vec<DownloadEntry>) -> InstallerResult<BTreeSet<String>> {
        tokio::fs::create_dir_all(self.output_dir)
            .await
            .map_err(|e| InstallerError::io(self.output_dir, e))?;
        DownloadPool::new(self.fetcher, self.output_dir, self.concurrency)
            .download_all(entries)
            .await
    }

    fn pack_manifest(
        &self,
        project: &ProjectInfo,
        version: &PackageVersion,
        index: &PackIndex,
        loader: Option<&LoaderOutcome>,
        level: Option<&str>,
        files: BTreeSet<String>,
    ) -> InstallManifest {
        let mut manifest = InstallManifest::new(self.platform.manifest_kind())
            .with_files(files)
            .with_field(PROJECT_ID, version.project_id.as_str())
            .with_field(PROJECT_SLUG, project.slug.as_str())
            .with_field(VERSION_ID, version.version_id.as_str())
            .with_field(VERSION_NUMBER, version.version_number.as_str())
            .with_field(MINECRAFT_VERSION, index.loader.minecraft_version.as_str())
            .with_field(LOADER_TYPE, index.loader.type_name());
        if let Some(loader) = loader {
            manifest = manifest
                .with_field(SERVER_ENTRY, loader.server_entry.as_str())
                .with_field(FAMILY, loader.kind.family());
        }
        if let Some(level) = level {
            manifest = manifest.with_field(LEVEL, level);
        }
        manifest
    }

    /// Emit the results recorded in a pack manifest.
    async fn report_recorded(&self, manifest: &InstallManifest) -> InstallerResult<()> {
        let recorded = [
            ("VERSION", MINECRAFT_VERSION),
            ("TYPE", LOADER_TYPE),
            ("SERVER", SERVER_ENTRY),
            ("FAMILY", FAMILY),
            ("LEVEL", LEVEL),
        ];
        let values: Vec<(&str, &str)> = recorded
            .iter()
            .filter_map(|(key, field)| manifest.field(field).map(|v| (*key, v)))
            .collect();
        self.results.write(&values).await
    }
}

/// Apply every overrides root in order on the blocking pool.
/// A later root's level detection wins.
async fn extract_overrides(
    mut archive: PackArchive<std::fs::File>,
    roots: Vec<String>,
    output_dir: PathBuf,
    options: OverridesOptions,
) -> InstallerResult<OverridesOutcome> {
    tokio::task::spawn_blocking(move || {
        let mut merged = OverridesOutcome::default();
        for root in &roots {
            let applied = apply_overrides(&mut archive, root, &output_dir, &options)?;
            merged.installed.extend(applied.installed);
            if applied.level.is_some() {
                merged.level = applied.level;
            }
        }
        Ok(merged)
    })
    .await
    .map_err(|e| InstallerError::Other(format!("Overrides extraction task failed: {}", e)))?
}

/// Apply inclusion rules to the pack's file list.
///
/// A restricted file that survives the rules fails the install when required
/// and is skipped when optional.
fn select_files(
    index: &PackIndex,
    rules: &ExcludeIncludeRules,
    pack_slug: &str,
) -> InstallerResult<Vec<DownloadEntry>> {
    let calculator = FileInclusionCalculator::new(rules, pack_slug);
    let mut entries = Vec::with_capacity(index.files.len());

    for file in &index.files {
        match calculator.decide(file) {
            InclusionDecision::Included => {}
            InclusionDecision::ForceIncluded { rule } => {
                debug!("Force-including {} (matched '{}')", file.path, rule);
            }
            InclusionDecision::ExcludedByEnvironment => {
                debug!("Skipping client-only {}", file.path);
                continue;
            }
            InclusionDecision::ExcludedByRule { rule } => {
                debug!("Excluding {} (matched '{}')", file.path, rule);
                continue;
            }
        }

        if let Some(restricted) = &file.restricted {
            if !file.optional {
                return Err(InstallerError::DistributionRestricted {
                    name: restricted.name.clone(),
                    file_id: restricted.file_id,
                });
            }
            warn!(
                "Skipping optional {} ({}): third-party downloads are not allowed",
                restricted.name, file.path
            );
            continue;
        }

        entries.push(DownloadEntry {
            rel_path: file.path.clone(),
            urls: file.downloads.clone(),
            sha1: file.sha1.clone(),
            optional: file.optional,
        });
    }
    Ok(entries)
}
