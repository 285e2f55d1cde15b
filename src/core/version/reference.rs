// ─── Package References ───
// Parses what the user typed into a project plus an optional version.

use std::fmt;
use std::str::FromStr;

use crate::core::error::InstallerError;
use crate::core::platforms::VersionType;

/// A project given as slug, id or page URL, optionally pinned to a version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageRef {
    pub id_or_slug: String,
    pub version: Option<String>,
}

impl PackageRef {
    /// The version named inside the reference wins over `fallback`.
    pub fn version_or<'a>(&'a self, fallback: Option<&'a str>) -> Option<&'a str> {
        self.version.as_deref().or(fallback)
    }
}

fn from_url(raw: &str) -> Option<PackageRef> {
    let rest = raw
        .strip_prefix("https://")
        .or_else(|| raw.strip_prefix("http://"))?;
    let segments: Vec<&str> = rest
        .split(['?', '#'])
        .next()?
        .split('/')
        .filter(|s| !s.is_empty())
        .collect();

    let (slug, version) = match segments.as_slice() {
        // modrinth.com/modpack/{slug}[/version/{v}]
        [host, _kind, slug, "version", version, ..] if host.ends_with("modrinth.com") => {
            (*slug, Some(*version))
        }
        [host, _kind, slug, ..] if host.ends_with("modrinth.com") => (*slug, None),
        // curseforge.com/minecraft/modpacks/{slug}[/files/{id}]
        [host, "minecraft", _class, slug, "files", file, ..] if host.ends_with("curseforge.com") => {
            (*slug, Some(*file))
        }
        [host, "minecraft", _class, slug, ..] if host.ends_with("curseforge.com") => (*slug, None),
        _ => return None,
    };

    Some(PackageRef {
        id_or_slug: slug.to_string(),
        version: version.map(str::to_string),
    })
}

impl FromStr for PackageRef {
    type Err = InstallerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.trim();
        if raw.is_empty() {
            return Err(InstallerError::InvalidParameter(
                "project reference is empty".into(),
            ));
        }

        if raw.contains("://") {
            return from_url(raw).ok_or_else(|| {
                InstallerError::InvalidParameter(format!("unrecognized project URL '{}'", raw))
            });
        }

        let (id_or_slug, version) = match raw.split_once(':') {
            Some((project, version)) => (project.trim(), Some(version.trim())),
            None => (raw, None),
        };
        if id_or_slug.is_empty() || version.is_some_and(str::is_empty) {
            return Err(InstallerError::InvalidParameter(format!(
                "malformed project reference '{}'",
                raw
            )));
        }

        Ok(PackageRef {
            id_or_slug: id_or_slug.to_string(),
            version: version.map(str::to_string),
        })
    }
}

impl fmt::Display for PackageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.version {
            Some(v) => write!(f, "{}:{}", self.id_or_slug, v),
            None => f.write_str(&self.id_or_slug),
        }
    }
}

/// Which version of a project to install.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionSpec {
    /// Newest version at least as stable as the tier.
    Latest(VersionType),
    /// A platform version id or a version number.
    Explicit(String),
}

impl VersionSpec {
    /// `latest` or nothing means the default tier; a bare tier name
    /// selects that tier; anything else is taken literally.
    pub fn parse(raw: Option<&str>, default_type: VersionType) -> Self {
        let Some(raw) = raw.map(str::trim).filter(|r| !r.is_empty()) else {
            return VersionSpec::Latest(default_type);
        };
        if raw.eq_ignore_ascii_case("latest") {
            return VersionSpec::Latest(default_type);
        }
        match raw.parse::<VersionType>() {
            Ok(tier) => VersionSpec::Latest(tier),
            Err(_) => VersionSpec::Explicit(raw.to_string()),
        }
    }
}
