use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use crate::core::error::{InstallerError, InstallerResult};

/// Discriminant stored as `@type` in every manifest file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ManifestKind {
    ModrinthModpack,
    CurseForgeModpack,
    Forge,
    NeoForge,
    Fabric,
    Quilt,
    CopyFiles,
}

/// Record of the files one target produced in the output directory.
///
/// `files` is exactly the set written by the run that saved the manifest.
/// Target-specific identity (project slug, version id, loader versions) lives
/// in `fields` and is flattened into the top-level JSON object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstallManifest {
    #[serde(rename = "@type")]
    pub kind: ManifestKind,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub files: BTreeSet<String>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl InstallManifest {
    pub fn new(kind: ManifestKind) -> Self {
        Self {
            kind,
            timestamp: Utc::now(),
            files: BTreeSet::new(),
            fields: Map::new(),
        }
    }

    pub fn with_files(mut self, files: impl IntoIterator<Item = String>) -> Self {
        self.files = files.into_iter().collect();
        self
    }

    pub fn with_field(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(key.to_string(), value.into());
        self
    }

    /// String-valued identity field.
    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }

    /// `.{target-id}-manifest.json`
    pub fn file_name(target_id: &str) -> String {
        format!(".{}-manifest.json", target_id)
    }

    pub fn path_in(output_dir: &Path, target_id: &str) -> PathBuf {
        output_dir.join(Self::file_name(target_id))
    }

    /// Whether every recorded file still exists under `output_dir`.
    pub fn all_files_present(&self, output_dir: &Path) -> bool {
        self.files.iter().all(|rel| output_dir.join(rel).is_file())
    }

    /// Read the manifest for `target_id`.
    ///
    /// A missing file means a first install. An unreadable one is reported and
    /// treated the same way, so the next successful run rewrites it.
    pub async fn load(output_dir: &Path, target_id: &str) -> InstallerResult<Option<Self>> {
        let path = Self::path_in(output_dir, target_id);
        let raw = match tokio::fs::read(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(InstallerError::io(path, e)),
        };

        match serde_json::from_slice(&raw) {
            Ok(manifest) => Ok(Some(manifest)),
            Err(e) => {
                warn!("Ignoring unparseable manifest {:?}: {}", path, e);
                Ok(None)
            }
        }
    }

    /// Replace the manifest for `target_id` in one rename.
    pub async fn save(&self, output_dir: &Path, target_id: &str) -> InstallerResult<()> {
        tokio::fs::create_dir_all(output_dir)
            .await
            .map_err(|e| InstallerError::io(output_dir, e))?;

        let path = Self::path_in(output_dir, target_id);
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_vec_pretty(self)?;

        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| InstallerError::io(&tmp, e))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| InstallerError::io(&path, e))?;
        Ok(())
    }
}
