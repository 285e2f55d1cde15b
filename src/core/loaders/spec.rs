use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::core::error::{InstallerError, InstallerResult};
use crate::core::manifest::ManifestKind;

/// The closed set of server mod loaders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoaderKind {
    Forge,
    NeoForge,
    Fabric,
    Quilt,
}

impl LoaderKind {
    /// Selection order when a pack lists more than one loader.
    pub const PRIORITY: [LoaderKind; 4] = [
        LoaderKind::Forge,
        LoaderKind::NeoForge,
        LoaderKind::Fabric,
        LoaderKind::Quilt,
    ];

    /// Target id used for the loader's own manifest.
    pub fn id(self) -> &'static str {
        match self {
            LoaderKind::Forge => "forge",
            LoaderKind::NeoForge => "neoforge",
            LoaderKind::Fabric => "fabric",
            LoaderKind::Quilt => "quilt",
        }
    }

    /// Value reported as `TYPE`.
    pub fn type_name(self) -> &'static str {
        match self {
            LoaderKind::Forge => "FORGE",
            LoaderKind::NeoForge => "NEOFORGE",
            LoaderKind::Fabric => "FABRIC",
            LoaderKind::Quilt => "QUILT",
        }
    }

    /// Value reported as `FAMILY`.
    pub fn family(self) -> &'static str {
        match self {
            LoaderKind::Forge | LoaderKind::NeoForge => "FORGE",
            LoaderKind::Fabric | LoaderKind::Quilt => "FABRIC",
        }
    }

    pub fn manifest_kind(self) -> ManifestKind {
        match self {
            LoaderKind::Forge => ManifestKind::Forge,
            LoaderKind::NeoForge => ManifestKind::NeoForge,
            LoaderKind::Fabric => ManifestKind::Fabric,
            LoaderKind::Quilt => ManifestKind::Quilt,
        }
    }

    /// Key used in `modrinth.index.json` dependencies.
    fn dependency_key(self) -> &'static str {
        match self {
            LoaderKind::Forge => "forge",
            LoaderKind::NeoForge => "neoforge",
            LoaderKind::Fabric => "fabric-loader",
            LoaderKind::Quilt => "quilt-loader",
        }
    }
}

impl fmt::Display for LoaderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LoaderKind::Forge => "Forge",
            LoaderKind::NeoForge => "NeoForge",
            LoaderKind::Fabric => "Fabric",
            LoaderKind::Quilt => "Quilt",
        };
        f.write_str(name)
    }
}

impl FromStr for LoaderKind {
    type Err = InstallerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "forge" => Ok(LoaderKind::Forge),
            "neoforge" => Ok(LoaderKind::NeoForge),
            "fabric" | "fabric-loader" => Ok(LoaderKind::Fabric),
            "quilt" | "quilt-loader" => Ok(LoaderKind::Quilt),
            other => Err(InstallerError::InvalidParameter(format!(
                "unknown mod loader '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoaderRequest {
    pub kind: LoaderKind,
    /// Concrete version or an alias such as `latest`.
    pub version: String,
}

/// Minecraft version plus at most one loader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoaderSpec {
    pub minecraft_version: String,
    pub loader: Option<LoaderRequest>,
}

impl LoaderSpec {
    pub fn vanilla(minecraft_version: &str) -> Self {
        Self {
            minecraft_version: minecraft_version.to_string(),
            loader: None,
        }
    }

    pub fn with_loader(minecraft_version: &str, kind: LoaderKind, version: &str) -> Self {
        Self {
            minecraft_version: minecraft_version.to_string(),
            loader: Some(LoaderRequest {
                kind,
                version: version.to_string(),
            }),
        }
    }

    /// Build from a Modrinth pack's `dependencies` map.
    pub fn from_dependencies(deps: &BTreeMap<String, String>) -> InstallerResult<Self> {
        for key in deps.keys() {
            let known = key == "minecraft"
                || LoaderKind::PRIORITY
                    .iter()
                    .any(|k| k.dependency_key() == key);
            if !known {
                return Err(InstallerError::InvalidParameter(format!(
                    "unsupported pack dependency '{}'",
                    key
                )));
            }
        }

        let minecraft = deps.get("minecraft").ok_or_else(|| {
            InstallerError::InvalidParameter("pack does not declare a minecraft version".into())
        })?;

        let loader = LoaderKind::PRIORITY.iter().find_map(|kind| {
            deps.get(kind.dependency_key()).map(|version| LoaderRequest {
                kind: *kind,
                version: version.clone(),
            })
        });

        Ok(Self {
            minecraft_version: minecraft.clone(),
            loader,
        })
    }

    /// Build from CurseForge loader ids such as `forge-47.2.0`; the primary
    /// id wins, otherwise the first one.
    pub fn from_curseforge(
        minecraft_version: &str,
        loader_ids: &[(String, bool)],
    ) -> InstallerResult<Self> {
        let chosen = loader_ids
            .iter()
            .find(|(_, primary)| *primary)
            .or_else(|| loader_ids.first());

        let Some((id, _)) = chosen else {
            return Ok(Self::vanilla(minecraft_version));
        };

        let (prefix, version) = id.split_once('-').ok_or_else(|| {
            InstallerError::InvalidParameter(format!("malformed mod loader id '{}'", id))
        })?;
        Ok(Self::with_loader(
            minecraft_version,
            prefix.parse()?,
            version,
        ))
    }

    /// `TYPE` reported for this spec.
    pub fn type_name(&self) -> &'static str {
        self.loader
            .as_ref()
            .map_or("VANILLA", |l| l.kind.type_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deps(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn dependencies_select_loader() {
        let spec =
            LoaderSpec::from_dependencies(&deps(&[("minecraft", "1.20.1"), ("fabric-loader", "0.15.7")]))
                .unwrap();
        assert_eq!(
            spec,
            LoaderSpec::with_loader("1.20.1", LoaderKind::Fabric, "0.15.7")
        );
        assert_eq!(spec.type_name(), "FABRIC");
    }

    #[test]
    fn forge_has_priority() {
        let spec = LoaderSpec::from_dependencies(&deps(&[
            ("minecraft", "1.20.1"),
            ("quilt-loader", "0.23.0"),
            ("forge", "47.2.0"),
        ]))
        .unwrap();
        assert_eq!(spec.loader.unwrap().kind, LoaderKind::Forge);
    }

    #[test]
    fn pack_without_loader_is_vanilla() {
        let spec = LoaderSpec::from_dependencies(&deps(&[("minecraft", "1.21")])).unwrap();
        assert_eq!(spec.loader, None);
        assert_eq!(spec.type_name(), "VANILLA");
    }

    #[test]
    fn unknown_or_missing_keys_are_rejected() {
        assert!(matches!(
            LoaderSpec::from_dependencies(&deps(&[("minecraft", "1.20.1"), ("liteloader", "1")])),
            Err(InstallerError::InvalidParameter(_))
        ));
        assert!(LoaderSpec::from_dependencies(&deps(&[("forge", "47.2.0")])).is_err());
    }

    #[test]
    fn curseforge_ids_prefer_primary() {
        let spec = LoaderSpec::from_curseforge(
            "1.20.1",
            &[
                ("forge-47.1.0".to_string(), false),
                ("neoforge-47.1.84".to_string(), true),
            ],
        )
        .unwrap();
        assert_eq!(
            spec,
            LoaderSpec::with_loader("1.20.1", LoaderKind::NeoForge, "47.1.84")
        );
        assert!(LoaderSpec::from_curseforge("1.20.1", &[("rift-1.0".to_string(), true)]).is_err());
    }
}
