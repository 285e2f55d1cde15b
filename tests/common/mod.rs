//! Shared fixtures for integration tests: an in-memory fetcher and pack builders.
#![allow(dead_code)]

use std::collections::HashMap;
use std::io::{Cursor, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{json, Value};
use sha1::{Digest, Sha1};
use zip::write::SimpleFileOptions;

use modpack_installer_lib::core::downloader::{DownloadOutcome, Fetcher};
use modpack_installer_lib::core::error::{InstallerError, InstallerResult};

pub const API: &str = "https://api.test/v2";
pub const CDN: &str = "https://cdn.test";

/// Serves canned bodies by exact URL and counts requests. Anything else is a 404.
#[derive(Default)]
pub struct FakeFetcher {
    routes: Mutex<HashMap<String, Vec<u8>>>,
    failures: Mutex<HashMap<String, u16>>,
    hits: Mutex<HashMap<String, usize>>,
    not_modified: AtomicBool,
}

impl FakeFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn serve(&self, url: &str, body: impl Into<Vec<u8>>) {
        self.routes
            .lock()
            .unwrap()
            .insert(url.to_string(), body.into());
    }

    pub fn serve_json(&self, url: &str, value: &Value) {
        self.serve(url, serde_json::to_vec(value).unwrap());
    }

    /// Answer `url` with an HTTP error status.
    pub fn fail(&self, url: &str, status: u16) {
        self.failures
            .lock()
            .unwrap()
            .insert(url.to_string(), status);
    }

    /// Answer 304 for downloads onto an existing file, the way a server
    /// honoring `If-Modified-Since` from a fresh mtime would.
    pub fn answer_not_modified(&self) {
        self.not_modified.store(true, Ordering::SeqCst);
    }

    pub fn hits(&self, url: &str) -> usize {
        self.hits.lock().unwrap().get(url).copied().unwrap_or(0)
    }

    fn lookup(&self, url: &str) -> InstallerResult<Vec<u8>> {
        *self.hits.lock().unwrap().entry(url.to_string()).or_default() += 1;
        if let Some(status) = self.failures.lock().unwrap().get(url) {
            return Err(InstallerError::HttpStatus {
                url: url.to_string(),
                status: *status,
            });
        }
        self.routes
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| InstallerError::HttpStatus {
                url: url.to_string(),
                status: 404,
            })
    }
}

#[async_trait]
impl Fetcher for FakeFetcher {
    async fn get_bytes(&self, url: &str, _headers: &[(&str, &str)]) -> InstallerResult<Vec<u8>> {
        self.lookup(url)
    }

    async fn download_file(
        &self,
        url: &str,
        dest: &Path,
        _headers: &[(&str, &str)],
    ) -> InstallerResult<DownloadOutcome> {
        let body = self.lookup(url)?;
        if dest.exists() && self.not_modified.load(Ordering::SeqCst) {
            return Ok(DownloadOutcome::UpToDate);
        }
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(dest, body).unwrap();
        Ok(DownloadOutcome::Downloaded)
    }
}

pub fn sha1_of(bytes: &[u8]) -> String {
    hex::encode(Sha1::digest(bytes))
}

pub fn zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for (name, contents) in entries {
        writer
            .start_file(*name, SimpleFileOptions::default())
            .unwrap();
        writer.write_all(contents).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

/// One published Modrinth pack version.
pub struct PackVersion<'a> {
    pub id: &'a str,
    pub number: &'a str,
    pub version_type: &'a str,
    /// Downloaded files as (pack path, contents).
    pub files: &'a [(&'a str, &'a [u8])],
    /// Archive entries under `overrides/`.
    pub overrides: &'a [(&'a str, &'a [u8])],
}

/// Build the pack's `.mrpack`, serve it and its files, and return the
/// version object as the Modrinth API lists it.
pub fn publish(fetcher: &FakeFetcher, project_id: &str, pack: &PackVersion) -> Value {
    let files: Vec<Value> = pack
        .files
        .iter()
        .map(|(path, contents)| {
            let url = format!("{}/{}/{}", CDN, pack.id, path);
            fetcher.serve(&url, contents.to_vec());
            json!({
                "path": path,
                "hashes": {"sha1": sha1_of(contents)},
                "env": {"client": "required", "server": "required"},
                "downloads": [url],
            })
        })
        .collect();

    let index = json!({
        "formatVersion": 1,
        "game": "minecraft",
        "versionId": pack.number,
        "name": "Test Pack",
        "files": files,
        "dependencies": {"minecraft": "1.20.1"},
    });
    let index = serde_json::to_vec(&index).unwrap();

    let override_names: Vec<String> = pack
        .overrides
        .iter()
        .map(|(path, _)| format!("overrides/{}", path))
        .collect();
    let mut entries: Vec<(&str, &[u8])> = vec![("modrinth.index.json", index.as_slice())];
    for (name, (_, contents)) in override_names.iter().zip(pack.overrides) {
        entries.push((name.as_str(), *contents));
    }
    let archive = zip_bytes(&entries);

    let archive_url = format!("{}/packs/{}.mrpack", CDN, pack.id);
    let archive_sha1 = sha1_of(&archive);
    fetcher.serve(&archive_url, archive);

    let version = json!({
        "id": pack.id,
        "project_id": project_id,
        "name": pack.number,
        "version_number": pack.number,
        "version_type": pack.version_type,
        "game_versions": ["1.20.1"],
        "loaders": ["minecraft"],
        "files": [{
            "url": archive_url,
            "filename": format!("{}.mrpack", pack.id),
            "primary": true,
            "hashes": {"sha1": archive_sha1},
        }],
    });
    fetcher.serve_json(&format!("{}/version/{}", API, pack.id), &version);
    version
}

/// Serve the project and its version listing, newest first.
pub fn serve_project(fetcher: &FakeFetcher, project_id: &str, slug: &str, versions: &[Value]) {
    fetcher.serve_json(
        &format!("{}/project/{}", API, slug),
        &json!({"id": project_id, "slug": slug, "title": "Test Pack", "project_type": "modpack"}),
    );
    fetcher.serve_json(
        &format!("{}/project/{}/version", API, slug),
        &Value::Array(versions.to_vec()),
    );
}

pub fn archive_url(version_id: &str) -> String {
    format!("{}/packs/{}.mrpack", CDN, version_id)
}

pub fn listing_url(slug: &str) -> String {
    format!("{}/project/{}/version", API, slug)
}
