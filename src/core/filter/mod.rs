//! Server-side file inclusion rules.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::error::{InstallerError, InstallerResult};
use crate::core::modpack::{EnvSupport, ModpackFileDescriptor};

/// Contents of an exclude/include rules file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExcludeIncludeRules {
    #[serde(default)]
    pub global_excludes: Vec<String>,
    #[serde(default)]
    pub global_force_includes: Vec<String>,
    /// Keyed by pack slug.
    #[serde(default)]
    pub modpacks: HashMap<String, PackRules>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackRules {
    #[serde(default)]
    pub excludes: Vec<String>,
    #[serde(default)]
    pub force_includes: Vec<String>,
}

impl ExcludeIncludeRules {
    pub fn load(path: &Path) -> InstallerResult<Self> {
        let raw = std::fs::read(path).map_err(|e| InstallerError::io(path, e))?;
        serde_json::from_slice(&raw).map_err(|e| {
            InstallerError::InvalidParameter(format!(
                "exclude/include file {}: {}",
                path.display(),
                e
            ))
        })
    }

    /// Add rules given directly on the command line to the global lists.
    pub fn with_globals(mut self, excludes: &[String], force_includes: &[String]) -> Self {
        self.global_excludes.extend(excludes.iter().cloned());
        self.global_force_includes
            .extend(force_includes.iter().cloned());
        self
    }
}

/// Why a file was kept or dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InclusionDecision {
    Included,
    ForceIncluded { rule: String },
    ExcludedByEnvironment,
    ExcludedByRule { rule: String },
}

impl InclusionDecision {
    pub fn is_included(&self) -> bool {
        matches!(
            self,
            InclusionDecision::Included | InclusionDecision::ForceIncluded { .. }
        )
    }
}

/// Decides whether a pack file belongs in a server installation.
#[derive(Debug, Clone)]
pub struct FileInclusionCalculator {
    excludes: Vec<String>,
    force_includes: Vec<String>,
}

impl FileInclusionCalculator {
    /// Combine global rules with the ones scoped to `pack_slug`.
    pub fn new(rules: &ExcludeIncludeRules, pack_slug: &str) -> Self {
        let scoped = rules.modpacks.get(pack_slug);
        let normalize = |rules: &[String]| -> Vec<String> {
            rules
                .iter()
                .map(|r| normalize(r))
                .filter(|r| !r.is_empty())
                .collect()
        };

        let mut excludes = normalize(&rules.global_excludes);
        let mut force_includes = normalize(&rules.global_force_includes);
        if let Some(scoped) = scoped {
            excludes.extend(normalize(&scoped.excludes));
            force_includes.extend(normalize(&scoped.force_includes));
        }

        Self {
            excludes,
            force_includes,
        }
    }

    pub fn include_file(&self, descriptor: &ModpackFileDescriptor) -> bool {
        self.decide(descriptor).is_included()
    }

    pub fn decide(&self, descriptor: &ModpackFileDescriptor) -> InclusionDecision {
        let forced = first_match(&self.force_includes, descriptor);

        if descriptor.server_support() == Some(EnvSupport::Unsupported) && forced.is_none() {
            return InclusionDecision::ExcludedByEnvironment;
        }
        if let Some(rule) = forced {
            return InclusionDecision::ForceIncluded { rule };
        }
        if let Some(rule) = first_match(&self.excludes, descriptor) {
            return InclusionDecision::ExcludedByRule { rule };
        }
        InclusionDecision::Included
    }
}

fn normalize(raw: &str) -> String {
    raw.trim().replace('\\', "/").to_lowercase()
}

fn first_match(rules: &[String], descriptor: &ModpackFileDescriptor) -> Option<String> {
    let path = normalize(&descriptor.path);
    let slug = descriptor.package_slug.as_deref().map(normalize);

    rules
        .iter()
        .find(|rule| {
            path.contains(rule.as_str())
                || slug.as_deref().is_some_and(|s| s.contains(rule.as_str()))
        })
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::modpack::FileEnv;

    fn file(path: &str, server: Option<EnvSupport>) -> ModpackFileDescriptor {
        ModpackFileDescriptor {
            path: path.to_string(),
            downloads: vec![],
            sha1: None,
            env: server.map(|s| FileEnv {
                client: Some(EnvSupport::Required),
                server: Some(s),
            }),
            package_slug: None,
            optional: false,
            restricted: None,
        }
    }

    fn rules(excludes: &[&str], force: &[&str]) -> ExcludeIncludeRules {
        ExcludeIncludeRules {
            global_excludes: excludes.iter().map(|s| s.to_string()).collect(),
            global_force_includes: force.iter().map(|s| s.to_string()).collect(),
            modpacks: HashMap::new(),
        }
    }

    #[test]
    fn unsupported_server_files_are_dropped_without_rules() {
        let calc = FileInclusionCalculator::new(&ExcludeIncludeRules::default(), "pack");
        let included: Vec<_> = [
            file("mods/a.jar", Some(EnvSupport::Required)),
            file("mods/b.jar", Some(EnvSupport::Unsupported)),
        ]
        .into_iter()
        .filter(|f| calc.include_file(f))
        .map(|f| f.path)
        .collect();

        assert_eq!(included, vec!["mods/a.jar"]);
    }

    #[test]
    fn force_include_beats_exclude() {
        let calc = FileInclusionCalculator::new(&rules(&["iris"], &["iris"]), "pack");
        assert!(calc.include_file(&file("mods/Iris-1.6.jar", None)));
    }

    #[test]
    fn exclude_only_drops_file() {
        let calc = FileInclusionCalculator::new(&rules(&["iris"], &[]), "pack");
        assert_eq!(
            calc.decide(&file("mods/iris-1.6.jar", None)),
            InclusionDecision::ExcludedByRule {
                rule: "iris".into()
            }
        );
    }

    #[test]
    fn force_include_overrides_unsupported_environment() {
        let calc = FileInclusionCalculator::new(&rules(&[], &["sodium"]), "pack");
        assert!(calc.include_file(&file("mods/sodium.jar", Some(EnvSupport::Unsupported))));
    }

    #[test]
    fn missing_env_is_server_applicable() {
        let calc = FileInclusionCalculator::new(&ExcludeIncludeRules::default(), "pack");
        assert_eq!(calc.decide(&file("mods/x.jar", None)), InclusionDecision::Included);
    }

    #[test]
    fn matching_is_case_insensitive_and_separator_agnostic() {
        let calc = FileInclusionCalculator::new(&rules(&["Mods\\Client"], &[]), "pack");
        assert!(!calc.include_file(&file("mods/client-tweaks.jar", None)));
    }

    #[test]
    fn pack_scoped_rules_apply_only_to_that_pack() {
        let mut rules = ExcludeIncludeRules::default();
        rules.modpacks.insert(
            "atm9".into(),
            PackRules {
                excludes: vec!["oculus".into()],
                force_includes: vec![],
            },
        );

        let scoped = FileInclusionCalculator::new(&rules, "atm9");
        let other = FileInclusionCalculator::new(&rules, "other");
        let f = file("mods/oculus.jar", None);
        assert!(!scoped.include_file(&f));
        assert!(other.include_file(&f));
    }

    #[test]
    fn slug_is_matched_as_well_as_path() {
        let calc = FileInclusionCalculator::new(&rules(&["journeymap"], &[]), "pack");
        let mut f = file("mods/jm-5.9.jar", None);
        f.package_slug = Some("journeymap".into());
        assert!(!calc.include_file(&f));
    }

    #[test]
    fn rules_file_uses_documented_keys() {
        let json = r#"{
            "globalExcludes": ["a"],
            "globalForceIncludes": ["b"],
            "modpacks": {"atm9": {"excludes": ["c"], "forceIncludes": ["d"]}}
        }"#;
        let parsed: ExcludeIncludeRules = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.global_excludes, vec!["a"]);
        assert_eq!(parsed.modpacks["atm9"].force_includes, vec!["d"]);
    }
}
