//! CurseForge modpack zips: `manifest.json` plus an overrides folder.

use std::io::{Read, Seek};

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use serde::Deserialize;
use tracing::{info, warn};

use super::{
    sanitize_pack_path, EnvSupport, FileEnv, ModpackFileDescriptor, PackIndex, RestrictedFile,
};
use crate::core::archive::PackArchive;
use crate::core::error::InstallerResult;
use crate::core::loaders::LoaderSpec;
use crate::core::platforms::curseforge::{CfFile, CfMod};

pub const MANIFEST_FILE: &str = "manifest.json";

const CLASS_RESOURCE_PACKS: u64 = 12;
const CLASS_SHADER_PACKS: u64 = 6552;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CfPackManifest {
    pub minecraft: CfMinecraft,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub files: Vec<CfPackFile>,
    #[serde(default = "default_overrides")]
    pub overrides: String,
}

fn default_overrides() -> String {
    "overrides".to_string()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CfMinecraft {
    pub version: String,
    #[serde(default)]
    pub mod_loaders: Vec<CfModLoader>,
}

#[derive(Debug, Deserialize)]
pub struct CfModLoader {
    pub id: String,
    #[serde(default)]
    pub primary: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CfPackFile {
    #[serde(rename = "projectID")]
    pub project_id: u64,
    #[serde(rename = "fileID")]
    pub file_id: u64,
    #[serde(default = "required_by_default")]
    pub required: bool,
}

fn required_by_default() -> bool {
    true
}

/// Lookups needed to turn pack entries into downloadable files.
#[async_trait]
pub trait CfModLookup: Send + Sync {
    async fn mod_info(&self, mod_id: u64) -> InstallerResult<CfMod>;
    async fn mod_file(&self, mod_id: u64, file_id: u64) -> InstallerResult<CfFile>;
}

/// Mods and unknown classes go to `mods/`.
fn class_folder(class_id: Option<u64>) -> &'static str {
    match class_id {
        Some(CLASS_RESOURCE_PACKS) => "resourcepacks",
        Some(CLASS_SHADER_PACKS) => "shaderpacks",
        _ => "mods",
    }
}

/// Build the descriptor for one resolved pack entry.
///
/// A file whose author disallows third-party downloads is marked restricted
/// rather than rejected, so inclusion rules can still drop it.
pub fn describe_file(
    entry: &CfPackFile,
    project: &CfMod,
    file: &CfFile,
) -> InstallerResult<ModpackFileDescriptor> {
    let restricted = file.download_url.is_none().then(|| RestrictedFile {
        name: project.name.clone(),
        file_id: file.id,
    });
    let env = file.is_client_only().then(|| FileEnv {
        client: Some(EnvSupport::Required),
        server: Some(EnvSupport::Unsupported),
    });
    let path = sanitize_pack_path(&format!("{}/{}", class_folder(project.class_id), file.file_name))?;

    Ok(ModpackFileDescriptor {
        path,
        downloads: file.download_url.iter().cloned().collect(),
        sha1: file.sha1().map(str::to_string),
        env,
        package_slug: Some(project.slug.clone()),
        optional: !entry.required,
        restricted,
    })
}

impl CfPackManifest {
    pub fn loader_spec(&self) -> InstallerResult<LoaderSpec> {
        let ids: Vec<(String, bool)> = self
            .minecraft
            .mod_loaders
            .iter()
            .map(|l| (l.id.clone(), l.primary))
            .collect();
        LoaderSpec::from_curseforge(&self.minecraft.version, &ids)
    }
}

async fn resolve_entry(
    lookup: &dyn CfModLookup,
    entry: &CfPackFile,
) -> InstallerResult<Option<ModpackFileDescriptor>> {
    let project = lookup.mod_info(entry.project_id).await;
    let file = lookup.mod_file(entry.project_id, entry.file_id).await;
    match (project, file) {
        (Ok(project), Ok(file)) => describe_file(entry, &project, &file).map(Some),
        (Err(e), _) | (_, Err(e)) if !entry.required => {
            warn!(
                "Skipping optional project {} file {}: {}",
                entry.project_id, entry.file_id, e
            );
            Ok(None)
        }
        (Err(e), _) | (_, Err(e)) => Err(e),
    }
}

/// Resolve every pack entry through `lookup`, at most `concurrency` at a time.
pub async fn resolve_files(
    lookup: &dyn CfModLookup,
    entries: &[CfPackFile],
    concurrency: usize,
) -> InstallerResult<Vec<ModpackFileDescriptor>> {
    info!("Resolving {} CurseForge pack files", entries.len());

    let resolved: Vec<InstallerResult<Option<ModpackFileDescriptor>>> = stream::iter(
        entries
            .iter()
            .map(|entry| resolve_entry(lookup, entry))
            .collect::<Vec<_>>(),
    )
        .buffered(concurrency.max(1))
        .collect()
        .await;

    let mut files = Vec::with_capacity(resolved.len());
    for result in resolved {
        if let Some(descriptor) = result? {
            files.push(descriptor);
        }
    }
    Ok(files)
}

pub async fn read_cf_pack<R: Read + Seek>(
    lookup: &dyn CfModLookup,
    archive: &mut PackArchive<R>,
    concurrency: usize,
) -> InstallerResult<PackIndex> {
    let manifest: CfPackManifest = archive.read_json(MANIFEST_FILE)?;
    let loader = manifest.loader_spec()?;
    let files = resolve_files(lookup, &manifest.files, concurrency).await?;

    Ok(PackIndex {
        name: manifest.name,
        files,
        loader,
        overrides_roots: vec![manifest.overrides],
    })
}
