use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing::info;

use crate::core::cache::{parse_duration, ApiCache, TtlConfig};
use crate::core::copy::{copy_files, CopyRequest};
use crate::core::downloader::RetryPolicy;
use crate::core::error::{InstallerError, InstallerResult};
use crate::core::filter::ExcludeIncludeRules;
use crate::core::loaders::{install_loader, LoaderKind, LoaderSpec};
use crate::core::orchestrator::{InstallSummary, InstallationOrchestrator, PackInstallOptions};
use crate::core::overrides::{GlobSet, OverridesOptions};
use crate::core::platforms::curseforge::CurseForgeClient;
use crate::core::platforms::modrinth::ModrinthClient;
use crate::core::platforms::{PackPlatform, VersionFilters, VersionType};
use crate::core::state::{InstallerSettings, InstallerState, DEFAULT_CONCURRENT_DOWNLOADS};
use crate::core::version::PackageRef;

const CACHE_NAMESPACES: [&str; 2] = ["modrinth", "curseforge"];

/// Installs and keeps game server file trees in sync with modpacks and mod loaders.
#[derive(Debug, Parser)]
#[command(name = "modpack-installer", version, about)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOptions,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Args)]
pub struct GlobalOptions {
    /// Server directory that receives the installed files.
    #[arg(long, env = "OUTPUT_DIRECTORY", default_value = ".", global = true)]
    pub output_directory: PathBuf,

    /// KEY=value file read by the container entrypoint.
    #[arg(long, env = "RESULTS_FILE", global = true)]
    pub results_file: Option<PathBuf>,

    #[arg(long, env = "API_CACHE_DEFAULT_TTL", default_value = "P2D", global = true)]
    pub api_cache_default_ttl: String,

    /// Per-operation TTL as OPERATION=DURATION, e.g. getProjectVersions=PT1H.
    #[arg(long, env = "API_CACHE_TTL", value_delimiter = ',', global = true)]
    pub api_cache_ttl: Vec<String>,

    #[arg(long, env = "DISABLE_API_CACHING", global = true)]
    pub disable_api_caching: bool,

    #[arg(long, env = "CONCURRENT_DOWNLOADS", default_value_t = DEFAULT_CONCURRENT_DOWNLOADS, global = true)]
    pub concurrent_downloads: usize,

    #[arg(long, env = "HTTP_RETRY_MAX_ATTEMPTS", default_value_t = 5, global = true)]
    pub http_retry_max_attempts: usize,

    #[arg(long, env = "HTTP_RETRY_INITIAL_DELAY", default_value = "500ms", global = true)]
    pub http_retry_initial_delay: String,

    #[arg(long, env = "DEBUG", global = true)]
    pub debug: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Install or update a Modrinth modpack.
    InstallModrinthModpack(ModrinthArgs),
    /// Install or update a CurseForge modpack.
    #[command(name = "install-curseforge")]
    InstallCurseForge(CurseForgeArgs),
    InstallForge(LoaderArgs),
    #[command(name = "install-neoforge")]
    InstallNeoForge(LoaderArgs),
    InstallFabricLoader(LoaderArgs),
    InstallQuilt(LoaderArgs),
    /// Copy files, directories or URLs into a destination tracked by a scope manifest.
    CopyFiles(CopyArgs),
    /// Drop expired API cache entries and orphaned payload files.
    PruneApiCache,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LevelFrom {
    Overrides,
}

/// Options shared by every modpack installer.
#[derive(Debug, Clone, Args)]
pub struct PackArgs {
    #[arg(long, env = "EXCLUDE_INCLUDE_FILE")]
    pub exclude_include_file: Option<PathBuf>,

    /// Extra substrings excluded from every pack.
    #[arg(long, env = "EXCLUDE_MODS", value_delimiter = ',')]
    pub exclude_mods: Vec<String>,

    /// Extra substrings included even when excluded otherwise.
    #[arg(long, env = "FORCE_INCLUDE_MODS", value_delimiter = ',')]
    pub force_include_mods: Vec<String>,

    #[arg(long, env = "FORCE_SYNCHRONIZE")]
    pub force_synchronize: bool,

    #[arg(long, env = "FORCE_MODLOADER_REINSTALL")]
    pub force_modloader_reinstall: bool,

    #[arg(long, env = "OVERRIDES_EXCLUSIONS", value_delimiter = ',')]
    pub overrides_exclusions: Vec<String>,

    #[arg(long, env = "OVERRIDES_SKIP_EXISTING")]
    pub overrides_skip_existing: bool,

    #[arg(long, env = "SET_LEVEL_FROM", value_enum)]
    pub set_level_from: Option<LevelFrom>,

    #[arg(long, env = "DEFAULT_VERSION_TYPE", default_value = "release")]
    pub default_version_type: VersionType,

    /// Only consider pack versions for this game version.
    #[arg(long, env = "GAME_VERSION")]
    pub game_version: Option<String>,

    /// Only consider pack versions for this mod loader.
    #[arg(long, env = "MOD_LOADER")]
    pub loader: Option<String>,
}

#[derive(Debug, Clone, Args)]
pub struct ModrinthArgs {
    /// Slug, id or modrinth.com URL, optionally `slug:version`.
    #[arg(long, env = "MODRINTH_PROJECT")]
    pub project: String,

    /// Version id, version number, release/beta/alpha or latest.
    #[arg(long, env = "MODRINTH_VERSION")]
    pub version: Option<String>,

    #[command(flatten)]
    pub pack: PackArgs,
}

#[derive(Debug, Clone, Args)]
pub struct CurseForgeArgs {
    /// Slug, numeric id or curseforge.com URL.
    #[arg(long, env = "CF_SLUG")]
    pub slug: String,

    #[arg(long, env = "CF_FILE_ID")]
    pub file_id: Option<String>,

    #[arg(long, env = "CF_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    #[command(flatten)]
    pub pack: PackArgs,
}

#[derive(Debug, Clone, Args)]
pub struct LoaderArgs {
    #[arg(long, env = "MINECRAFT_VERSION")]
    pub minecraft_version: String,

    /// Loader version, or latest/recommended/beta where supported.
    #[arg(
        long,
        env = "LOADER_VERSION",
        default_value = "latest",
        visible_aliases = ["forge-version", "neoforge-version", "fabric-loader-version", "quilt-loader-version"]
    )]
    pub loader_version: String,

    #[arg(long, env = "FORCE_REINSTALL")]
    pub force_reinstall: bool,
}

#[derive(Debug, Clone, Args)]
pub struct CopyArgs {
    /// Name of the manifest tracking this copy.
    #[arg(long)]
    pub scope: String,

    #[arg(long)]
    pub to: PathBuf,

    /// Only copy directory entries matching these globs.
    #[arg(long, value_delimiter = ',')]
    pub glob: Vec<String>,

    #[arg(required = true)]
    pub sources: Vec<String>,
}

impl GlobalOptions {
    pub fn settings(&self) -> InstallerResult<InstallerSettings> {
        let default_ttl = parse_duration(&self.api_cache_default_ttl)?;
        let cache_ttl = TtlConfig {
            default_ttl,
            ..TtlConfig::default()
        }
        .with_overrides(&self.api_cache_ttl)?;

        let initial_delay = parse_duration(&self.http_retry_initial_delay)?
            .to_std()
            .map_err(|_| {
                InstallerError::InvalidParameter(format!(
                    "negative retry delay '{}'",
                    self.http_retry_initial_delay
                ))
            })?;

        if self.concurrent_downloads == 0 {
            return Err(InstallerError::InvalidParameter(
                "--concurrent-downloads must be at least 1".into(),
            ));
        }

        Ok(InstallerSettings {
            output_dir: self.output_directory.clone(),
            results_file: self.results_file.clone(),
            concurrent_downloads: self.concurrent_downloads,
            api_caching: !self.disable_api_caching,
            cache_ttl,
            retry: RetryPolicy {
                max_attempts: self.http_retry_max_attempts.max(1),
                initial_delay,
                ..RetryPolicy::default()
            },
        })
    }
}

impl PackArgs {
    fn options(&self, reference: PackageRef, version: Option<String>) -> InstallerResult<PackInstallOptions> {
        let rules = match &self.exclude_include_file {
            Some(path) => ExcludeIncludeRules::load(path)?,
            None => ExcludeIncludeRules::default(),
        }
        .with_globals(&self.exclude_mods, &self.force_include_mods);

        Ok(PackInstallOptions {
            reference,
            version,
            default_version_type: self.default_version_type,
            filters: VersionFilters {
                loaders: self.loader.iter().cloned().collect(),
                game_versions: self.game_version.iter().cloned().collect(),
            },
            rules,
            overrides: OverridesOptions {
                skip_existing: self.overrides_skip_existing,
                exclusions: GlobSet::new(&self.overrides_exclusions)?,
                level_from_overrides: self.set_level_from == Some(LevelFrom::Overrides),
            },
            force_synchronize: self.force_synchronize,
            force_loader_reinstall: self.force_modloader_reinstall,
        })
    }
}

/// Run one subcommand against `state`.
pub async fn execute(command: Command, state: &InstallerState) -> InstallerResult<()> {
    match command {
        Command::InstallModrinthModpack(args) => install_modrinth_modpack(args, state).await,
        Command::InstallCurseForge(args) => install_curseforge(args, state).await,
        Command::InstallForge(args) => install_mod_loader(LoaderKind::Forge, args, state).await,
        Command::InstallNeoForge(args) => install_mod_loader(LoaderKind::NeoForge, args, state).await,
        Command::InstallFabricLoader(args) => install_mod_loader(LoaderKind::Fabric, args, state).await,
        Command::InstallQuilt(args) => install_mod_loader(LoaderKind::Quilt, args, state).await,
        Command::CopyFiles(args) => copy(args, state).await,
        Command::PruneApiCache => prune_api_cache(state),
    }
}

async fn install_modrinth_modpack(args: ModrinthArgs, state: &InstallerState) -> InstallerResult<()> {
    let reference: PackageRef = args.project.parse()?;
    let options = args.pack.options(reference, args.version)?;
    let client = ModrinthClient::new(state.fetcher.clone(), state.api_cache("modrinth"));
    install_pack(&client, &options, state).await
}

async fn install_curseforge(args: CurseForgeArgs, state: &InstallerState) -> InstallerResult<()> {
    let reference: PackageRef = args.slug.parse()?;
    let options = args.pack.options(reference, args.file_id)?;
    let client = CurseForgeClient::new(
        state.fetcher.clone(),
        state.api_cache("curseforge"),
        args.api_key,
        state.settings.concurrent_downloads,
    )?;
    install_pack(&client, &options, state).await
}

async fn install_pack<P: PackPlatform>(
    platform: &P,
    options: &PackInstallOptions,
    state: &InstallerState,
) -> InstallerResult<()> {
    let orchestrator = InstallationOrchestrator::new(
        platform,
        state.fetcher.as_ref(),
        &state.settings.output_dir,
        &state.results,
        state.settings.concurrent_downloads,
    );

    match orchestrator.install(options).await? {
        InstallSummary::UpToDate { version } => {
            info!("Modpack is up to date at {}", version.version_number);
        }
        InstallSummary::Installed {
            version,
            files,
            cleanup,
            loader,
        } => {
            info!(
                "Modpack {} installed: {} file(s), {} stale file(s) removed{}",
                version.version_number,
                files,
                cleanup.removed.len(),
                loader
                    .map(|l| format!(", {} {} ({})", l.kind, l.loader_version, l.server_entry))
                    .unwrap_or_default()
            );
        }
    }
    Ok(())
}

async fn install_mod_loader(
    kind: LoaderKind,
    args: LoaderArgs,
    state: &InstallerState,
) -> InstallerResult<()> {
    let spec = LoaderSpec::with_loader(&args.minecraft_version, kind, &args.loader_version);
    let outcome = install_loader(
        &spec,
        &state.settings.output_dir,
        state.fetcher.as_ref(),
        &state.results,
        args.force_reinstall,
    )
    .await?;

    if let Some(outcome) = outcome {
        info!(
            "{} {} for Minecraft {} ready: {}",
            outcome.kind, outcome.loader_version, outcome.minecraft_version, outcome.server_entry
        );
    }
    Ok(())
}

async fn copy(args: CopyArgs, state: &InstallerState) -> InstallerResult<()> {
    let glob = if args.glob.is_empty() {
        None
    } else {
        Some(GlobSet::new(&args.glob)?)
    };
    let request = CopyRequest {
        scope: args.scope,
        destination: args.to,
        sources: args.sources,
        glob,
    };
    copy_files(state.fetcher.as_ref(), &request).await?;
    Ok(())
}

fn prune_api_cache(state: &InstallerState) -> InstallerResult<()> {
    for namespace in CACHE_NAMESPACES {
        let dir = state.settings.output_dir.join(".cache").join(namespace);
        if !dir.is_dir() {
            continue;
        }
        // Opening sweeps; flushing persists the pruned index.
        let cache: ApiCache = state.api_cache(namespace);
        cache.flush();
        info!("Pruned API cache {}", namespace);
    }
    Ok(())
}

/// Build the per-invocation state from parsed options.
pub fn build_state(global: &GlobalOptions) -> InstallerResult<InstallerState> {
    InstallerState::new(global.settings()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_modrinth_install() {
        let cli = Cli::try_parse_from([
            "modpack-installer",
            "--output-directory",
            "/data",
            "install-modrinth-modpack",
            "--project",
            "terralith",
            "--default-version-type",
            "beta",
            "--overrides-exclusions",
            "**/*.png,config/secret.toml",
            "--set-level-from",
            "overrides",
        ])
        .unwrap();

        assert_eq!(cli.global.output_directory, PathBuf::from("/data"));
        let Command::InstallModrinthModpack(args) = cli.command else {
            panic!("wrong subcommand");
        };
        assert_eq!(args.project, "terralith");
        assert_eq!(args.pack.default_version_type, VersionType::Beta);
        assert_eq!(args.pack.overrides_exclusions.len(), 2);
        assert_eq!(args.pack.set_level_from, Some(LevelFrom::Overrides));
    }

    #[test]
    fn settings_parse_durations_and_overrides() {
        let cli = Cli::try_parse_from([
            "modpack-installer",
            "--api-cache-default-ttl",
            "PT12H",
            "--api-cache-ttl",
            "getProjectVersions=15m",
            "--http-retry-initial-delay",
            "250ms",
            "prune-api-cache",
        ])
        .unwrap();

        let settings = cli.global.settings().unwrap();
        assert_eq!(settings.cache_ttl.default_ttl, chrono::Duration::hours(12));
        assert_eq!(
            settings.cache_ttl.ttl_for("getProjectVersions"),
            chrono::Duration::minutes(15)
        );
        assert_eq!(settings.retry.initial_delay, std::time::Duration::from_millis(250));
    }

    #[test]
    fn loader_version_aliases() {
        let cli = Cli::try_parse_from([
            "modpack-installer",
            "install-forge",
            "--minecraft-version",
            "1.20.1",
            "--forge-version",
            "recommended",
        ])
        .unwrap();
        let Command::InstallForge(args) = cli.command else {
            panic!("wrong subcommand");
        };
        assert_eq!(args.loader_version, "recommended");
    }
}
