//! Modrinth `.mrpack` format.

use std::collections::BTreeMap;
use std::io::{Read, Seek};

use serde::Deserialize;

use super::{sanitize_pack_path, EnvSupport, FileEnv, ModpackFileDescriptor, PackIndex};
use crate::core::archive::PackArchive;
use crate::core::error::{InstallerError, InstallerResult};
use crate::core::loaders::LoaderSpec;

pub const INDEX_FILE: &str = "modrinth.index.json";
pub const OVERRIDES_ROOTS: [&str; 2] = ["overrides", "server-overrides"];

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MrpackIndex {
    #[serde(default)]
    pub format_version: u32,
    pub game: String,
    #[serde(default)]
    pub version_id: String,
    pub name: String,
    #[serde(default)]
    pub files: Vec<MrpackFile>,
    #[serde(default)]
    pub dependencies: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MrpackFile {
    pub path: String,
    #[serde(default)]
    pub hashes: BTreeMap<String, String>,
    #[serde(default)]
    pub env: Option<FileEnv>,
    #[serde(default)]
    pub downloads: Vec<String>,
    #[serde(default)]
    pub file_size: Option<u64>,
}

impl MrpackIndex {
    pub fn into_pack_index(self) -> InstallerResult<PackIndex> {
        if self.game != "minecraft" {
            return Err(InstallerError::InvalidParameter(format!(
                "pack '{}' targets unsupported game '{}'",
                self.name, self.game
            )));
        }

        let loader = LoaderSpec::from_dependencies(&self.dependencies)?;
        let files = self
            .files
            .into_iter()
            .map(|f| {
                let optional = f
                    .env
                    .as_ref()
                    .is_some_and(|env| env.server == Some(EnvSupport::Optional));
                Ok(ModpackFileDescriptor {
                    path: sanitize_pack_path(&f.path)?,
                    downloads: f.downloads,
                    sha1: f.hashes.get("sha1").cloned(),
                    env: f.env,
                    package_slug: None,
                    optional,
                    restricted: None,
                })
            })
            .collect::<InstallerResult<Vec<_>>>()?;

        Ok(PackIndex {
            name: self.name,
            files,
            loader,
            overrides_roots: OVERRIDES_ROOTS.iter().map(|r| r.to_string()).collect(),
        })
    }
}

pub fn read_mrpack<R: Read + Seek>(archive: &mut PackArchive<R>) -> InstallerResult<PackIndex> {
    let index: MrpackIndex = archive.read_json(INDEX_FILE)?;
    index.into_pack_index()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::archive::test_support::zip_bytes;
    use crate::core::loaders::LoaderKind;

    const INDEX: &str = r#"{
        "formatVersion": 1,
        "game": "minecraft",
        "versionId": "1.0.0",
        "name": "Example Pack",
        "files": [
            {
                "path": "mods/a.jar",
                "hashes": {"sha1": "aaaa", "sha512": "bbbb"},
                "env": {"client": "required", "server": "required"},
                "downloads": ["https://cdn.modrinth.com/a.jar"],
                "fileSize": 10
            },
            {
                "path": "mods/b.jar",
                "hashes": {"sha1": "cccc"},
                "env": {"client": "required", "server": "optional"},
                "downloads": ["https://cdn.modrinth.com/b.jar"]
            }
        ],
        "dependencies": {"minecraft": "1.20.1", "fabric-loader": "0.15.7"}
    }"#;

    #[test]
    fn reads_index_from_archive() {
        let mut archive =
            PackArchive::from_bytes(zip_bytes(&[(INDEX_FILE, INDEX.as_bytes())]), "x.mrpack")
                .unwrap();
        let pack = read_mrpack(&mut archive).unwrap();

        assert_eq!(pack.name, "Example Pack");
        assert_eq!(pack.files.len(), 2);
        assert_eq!(pack.files[0].sha1.as_deref(), Some("aaaa"));
        assert!(!pack.files[0].optional);
        assert!(pack.files[1].optional);
        assert_eq!(pack.loader.loader.unwrap().kind, LoaderKind::Fabric);
        assert_eq!(pack.overrides_roots, vec!["overrides", "server-overrides"]);
    }

    #[test]
    fn escaping_paths_reject_the_pack() {
        let index = INDEX.replace("mods/a.jar\"", "../../a.jar\"");
        let parsed: MrpackIndex = serde_json::from_str(&index).unwrap();
        assert!(matches!(
            parsed.into_pack_index(),
            Err(InstallerError::InvalidParameter(_))
        ));
    }
}
