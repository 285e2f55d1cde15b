//! Pack file descriptors shared by every pack format.

pub mod curseforge;
pub mod modrinth;

use serde::{Deserialize, Serialize};

use crate::core::error::{InstallerError, InstallerResult};
use crate::core::loaders::LoaderSpec;

/// Declared applicability of a file to one side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvSupport {
    Required,
    Optional,
    Unsupported,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEnv {
    #[serde(default)]
    pub client: Option<EnvSupport>,
    #[serde(default)]
    pub server: Option<EnvSupport>,
}

/// One entry of a resolved pack's file list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModpackFileDescriptor {
    /// Output-relative path using `/` separators.
    pub path: String,
    /// Candidate download locations, tried in order.
    pub downloads: Vec<String>,
    pub sha1: Option<String>,
    pub env: Option<FileEnv>,
    /// Upstream slug of the package providing the file, when known.
    pub package_slug: Option<String>,
    /// Failure to fetch an optional file does not abort the install.
    pub optional: bool,
    /// Set when the author forbids third-party downloads; `downloads` is empty.
    pub restricted: Option<RestrictedFile>,
}

/// A pack file that can only be fetched from its platform's website.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestrictedFile {
    pub name: String,
    pub file_id: u64,
}

impl ModpackFileDescriptor {
    pub fn server_support(&self) -> Option<EnvSupport> {
        self.env.as_ref().and_then(|env| env.server)
    }
}

/// Everything the orchestrator needs from a downloaded pack archive.
#[derive(Debug, Clone)]
pub struct PackIndex {
    pub name: String,
    pub files: Vec<ModpackFileDescriptor>,
    pub loader: LoaderSpec,
    /// Archive roots holding override files, applied in order.
    pub overrides_roots: Vec<String>,
}

/// Normalize a pack-relative path and reject anything escaping the output
/// directory.
pub fn sanitize_pack_path(raw: &str) -> InstallerResult<String> {
    let normalized = raw.replace('\\', "/");
    let mut parts = Vec::new();
    for part in normalized.split('/') {
        match part {
            "" | "." => continue,
            ".." => {
                return Err(InstallerError::InvalidParameter(format!(
                    "pack path '{}' escapes the output directory",
                    raw
                )))
            }
            p if p.contains(':') => {
                return Err(InstallerError::InvalidParameter(format!(
                    "pack path '{}' is not relative",
                    raw
                )))
            }
            p => parts.push(p),
        }
    }
    if normalized.starts_with('/') || parts.is_empty() {
        return Err(InstallerError::InvalidParameter(format!(
            "pack path '{}' is not a relative file path",
            raw
        )));
    }
    Ok(parts.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_normalizes_separators() {
        assert_eq!(sanitize_pack_path("mods\\a.jar").unwrap(), "mods/a.jar");
        assert_eq!(sanitize_pack_path("./config//x.toml").unwrap(), "config/x.toml");
    }

    #[test]
    fn sanitize_rejects_escapes() {
        assert!(sanitize_pack_path("../evil.jar").is_err());
        assert!(sanitize_pack_path("/etc/passwd").is_err());
        assert!(sanitize_pack_path("C:/x.jar").is_err());
        assert!(sanitize_pack_path("").is_err());
    }
}
