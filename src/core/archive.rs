use std::fs::File;
use std::io::{Cursor, Read, Seek};
use std::path::Path;

use serde::de::DeserializeOwned;

use crate::core::error::{InstallerError, InstallerResult};

/// Random-access reader over a downloaded pack archive.
pub struct PackArchive<R> {
    archive: zip::ZipArchive<R>,
    source: String,
}

impl PackArchive<File> {
    pub fn open(path: &Path) -> InstallerResult<Self> {
        let file = File::open(path).map_err(|e| InstallerError::io(path, e))?;
        Ok(Self {
            archive: zip::ZipArchive::new(file)?,
            source: path.display().to_string(),
        })
    }
}

impl PackArchive<Cursor<Vec<u8>>> {
    pub fn from_bytes(bytes: Vec<u8>, source: impl Into<String>) -> InstallerResult<Self> {
        Ok(Self {
            archive: zip::ZipArchive::new(Cursor::new(bytes))?,
            source: source.into(),
        })
    }
}

impl<R: Read + Seek> PackArchive<R> {
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Entry names from the central directory, without decompressing anything.
    pub fn entry_names(&self) -> Vec<String> {
        self.archive.file_names().map(str::to_string).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.archive.index_for_name(name).is_some()
    }

    pub fn read_json<T: DeserializeOwned>(&mut self, name: &str) -> InstallerResult<T> {
        let bytes = self.read_bytes(name)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub fn read_bytes(&mut self, name: &str) -> InstallerResult<Vec<u8>> {
        let mut entry = self.archive.by_name(name).map_err(|_| {
            InstallerError::InvalidParameter(format!("{} does not contain {}", self.source, name))
        })?;
        let mut bytes = Vec::new();
        entry.read_to_end(&mut bytes)?;
        Ok(bytes)
    }

    /// Copy one entry to `dest`, creating parent directories.
    pub fn extract_entry(&mut self, name: &str, dest: &Path) -> InstallerResult<()> {
        let mut entry = self.archive.by_name(name)?;
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent).map_err(|e| InstallerError::io(parent, e))?;
        }
        let mut out = File::create(dest).map_err(|e| InstallerError::io(dest, e))?;
        std::io::copy(&mut entry, &mut out).map_err(|e| InstallerError::io(dest, e))?;
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::zip_bytes;
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn reads_json_and_extracts_entries() {
        let bytes = zip_bytes(&[
            ("modrinth.index.json", br#"{"name":"pack"}"#),
            ("overrides/config/a.toml", b"x = 1"),
        ]);
        let mut archive = PackArchive::from_bytes(bytes, "pack.mrpack").unwrap();

        let index: serde_json::Value = archive.read_json("modrinth.index.json").unwrap();
        assert_eq!(index["name"], "pack");
        assert!(archive.contains("overrides/config/a.toml"));

        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("config/a.toml");
        archive
            .extract_entry("overrides/config/a.toml", &dest)
            .unwrap();
        assert_eq!(std::fs::read_to_string(dest).unwrap(), "x = 1");
    }

    #[test]
    fn missing_entry_names_the_archive() {
        let mut archive = PackArchive::from_bytes(zip_bytes(&[]), "empty.zip").unwrap();
        let err = archive.read_bytes("manifest.json").unwrap_err();
        assert!(err.to_string().contains("empty.zip"));
    }
}
