use std::path::{Path, PathBuf};

use tracing::debug;

use crate::core::error::{InstallerError, InstallerResult};

/// `KEY=value` lines handed to the container entrypoint scripts.
///
/// Writing merges with what is already in the file: keys keep their
/// position, the newest value wins and new keys are appended.
#[derive(Debug, Clone, Default)]
pub struct ResultsFile {
    path: Option<PathBuf>,
}

impl ResultsFile {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self { path }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub async fn write(&self, values: &[(&str, &str)]) -> InstallerResult<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let existing = match tokio::fs::read_to_string(path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(InstallerError::io(path, e)),
        };

        let merged = merge(&existing, values);
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| InstallerError::io(parent, e))?;
        }
        tokio::fs::write(path, merged)
            .await
            .map_err(|e| InstallerError::io(path, e))?;

        debug!("Wrote {:?} to results file {:?}", values, path);
        Ok(())
    }
}

fn merge(existing: &str, values: &[(&str, &str)]) -> String {
    let mut lines: Vec<(String, String)> = existing
        .lines()
        .filter_map(|line| line.split_once('='))
        .map(|(k, v)| (k.trim().to_string(), v.to_string()))
        .collect();

    for (key, value) in values {
        match lines.iter_mut().find(|(k, _)| k == key) {
            Some(slot) => slot.1 = value.to_string(),
            None => lines.push((key.to_string(), value.to_string())),
        }
    }

    lines
        .into_iter()
        .map(|(k, v)| format!("{}={}\n", k, v))
        .collect()
}
