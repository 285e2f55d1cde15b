//! Copying of override files bundled in pack archives.

mod glob;

use std::io::{Read, Seek};
use std::path::Path;

use tracing::{debug, info};

pub use glob::GlobSet;

use crate::core::archive::PackArchive;
use crate::core::error::InstallerResult;
use crate::core::modpack::sanitize_pack_path;

const LEVEL_DAT: &str = "level.dat";

#[derive(Debug, Clone, Default)]
pub struct OverridesOptions {
    pub skip_existing: bool,
    pub exclusions: GlobSet,
    /// Report the detected world directory as the server's level name.
    pub level_from_overrides: bool,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct OverridesOutcome {
    /// Output-relative paths written by this pass and owned by the manifest.
    pub installed: Vec<String>,
    pub level: Option<String>,
}

/// Copy the entries under `root` into `output_dir`.
///
/// A world shipped in the overrides is copied only when it does not exist
/// yet, and its files are never returned, so manifest pruning can never
/// delete a running world.
pub fn apply_overrides<R: Read + Seek>(
    archive: &mut PackArchive<R>,
    root: &str,
    output_dir: &Path,
    options: &OverridesOptions,
) -> InstallerResult<OverridesOutcome> {
    let prefix = format!("{}/", root.trim_end_matches('/'));
    let entries: Vec<(String, String)> = archive
        .entry_names()
        .into_iter()
        .filter(|name| !name.ends_with('/'))
        .filter_map(|name| {
            let rel = name.strip_prefix(&prefix)?.to_string();
            Some((name, rel))
        })
        .collect();

    if entries.is_empty() {
        return Ok(OverridesOutcome::default());
    }

    let world_dir = detect_world_dir(entries.iter().map(|(_, rel)| rel.as_str()));
    let world_present = world_dir
        .as_deref()
        .is_some_and(|w| output_dir.join(w).exists());
    if let Some(world) = &world_dir {
        info!(
            "Overrides carry world '{}' ({})",
            world,
            if world_present { "already present, keeping it" } else { "new" }
        );
    }

    let mut outcome = OverridesOutcome {
        installed: Vec::new(),
        level: world_dir
            .clone()
            .filter(|_| options.level_from_overrides),
    };

    for (name, rel) in entries {
        let rel = match sanitize_pack_path(&rel) {
            Ok(rel) => rel,
            Err(e) => {
                debug!("Skipping override entry {}: {}", name, e);
                continue;
            }
        };

        if options.exclusions.is_match(&rel) {
            debug!("Excluded override {}", rel);
            continue;
        }

        let in_world = world_dir
            .as_deref()
            .is_some_and(|w| rel.starts_with(&format!("{}/", w)));
        if in_world && world_present {
            continue;
        }

        let dest = output_dir.join(&rel);
        if options.skip_existing && dest.exists() {
            debug!("Keeping existing {}", rel);
            continue;
        }

        archive.extract_entry(&name, &dest)?;
        if !in_world {
            outcome.installed.push(rel);
        }
    }

    info!(
        "Applied {} override file(s) from {}/",
        outcome.installed.len(),
        root
    );
    Ok(outcome)
}

/// Parent directory of the shallowest `level.dat`, if it is not the root.
fn detect_world_dir<'a>(paths: impl Iterator<Item = &'a str>) -> Option<String> {
    paths
        .filter_map(|p| {
            let normalized = p.replace('\\', "/");
            let (parent, file) = normalized.rsplit_once('/')?;
            (file == LEVEL_DAT && !parent.is_empty()).then(|| parent.to_string())
        })
        .min_by_key(|parent| parent.matches('/').count())
}
