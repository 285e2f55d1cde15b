//! Entry-point discovery for installers that only report their result as
//! free text. Best effort: scrape the log first, then probe known names.

use std::path::Path;

use regex::Regex;

use crate::core::modpack::sanitize_pack_path;

/// Last path in `log` that looks like a server entry point and exists under
/// `output_dir`.
pub fn scrape_entry_point(log: &str, output_dir: &Path) -> Option<String> {
    let re = Regex::new(r#"[^\s'"]*?(?:\.jar|unix_args\.txt)"#).ok()?;

    re.find_iter(log)
        .filter_map(|m| to_relative(m.as_str(), output_dir))
        .filter(|rel| is_entry_candidate(rel))
        .filter(|rel| output_dir.join(rel).is_file())
        .last()
}

/// First of `candidates` present under `output_dir`.
pub fn probe_entry_point(output_dir: &Path, candidates: &[String]) -> Option<String> {
    candidates
        .iter()
        .find(|rel| output_dir.join(rel).is_file())
        .cloned()
}

fn to_relative(token: &str, output_dir: &Path) -> Option<String> {
    let token = token.replace('\\', "/");
    let path = Path::new(&token);
    let rel = if path.is_absolute() {
        let base = output_dir
            .canonicalize()
            .unwrap_or_else(|_| output_dir.to_path_buf());
        path.strip_prefix(&base)
            .or_else(|_| path.strip_prefix(output_dir))
            .ok()?
            .to_string_lossy()
            .into_owned()
    } else {
        token
    };
    sanitize_pack_path(&rel).ok()
}

fn is_entry_candidate(rel: &str) -> bool {
    let name = rel.rsplit('/').next().unwrap_or(rel);
    if name == "unix_args.txt" {
        return true;
    }
    if rel.starts_with("libraries/") || name.ends_with("-installer.jar") {
        return false;
    }
    name.ends_with(".jar") && (name.starts_with("forge-") || name.starts_with("neoforge-"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(root: &Path, rel: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, b"").unwrap();
    }

    #[test]
    fn scrapes_relative_and_absolute_mentions() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "forge-1.16.5-36.2.39.jar");
        touch(dir.path(), "forge-1.20.1-47.2.0-installer.jar");

        let log = format!(
            "Extracting forge-1.20.1-47.2.0-installer.jar\n\
             Downloading libraries/net/minecraftforge/forge/1.16.5-36.2.39/forge-1.16.5-36.2.39.jar\n\
             Moving file to {}/forge-1.16.5-36.2.39.jar\n\
             The server installed successfully",
            dir.path().display()
        );

        assert_eq!(
            scrape_entry_point(&log, dir.path()).as_deref(),
            Some("forge-1.16.5-36.2.39.jar")
        );
    }

    #[test]
    fn scrapes_unix_args_for_modern_installers() {
        let dir = TempDir::new().unwrap();
        let args = "libraries/net/neoforged/neoforge/21.1.5/unix_args.txt";
        touch(dir.path(), args);

        let log = format!("Writing run script, args in {}\n", args);
        assert_eq!(scrape_entry_point(&log, dir.path()).as_deref(), Some(args));
    }

    #[test]
    fn mentions_of_missing_files_are_ignored() {
        let dir = TempDir::new().unwrap();
        assert_eq!(scrape_entry_point("Created forge-1.0.jar", dir.path()), None);
    }

    #[test]
    fn probe_returns_first_present_candidate() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "forge-1.20.1-47.2.0.jar");
        let candidates = vec![
            "forge-1.20.1-47.2.0-shim.jar".to_string(),
            "forge-1.20.1-47.2.0.jar".to_string(),
        ];
        assert_eq!(
            probe_entry_point(dir.path(), &candidates).as_deref(),
            Some("forge-1.20.1-47.2.0.jar")
        );
    }
}
