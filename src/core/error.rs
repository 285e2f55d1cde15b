use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// Central error type for the installer.
/// Every module returns `Result<T, InstallerError>`.
#[derive(Debug, Error)]
pub enum InstallerError {
    // ── IO ──────────────────────────────────────────────
    #[error("IO error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    // ── Network ─────────────────────────────────────────
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Request to {url} failed: HTTP {status}")]
    HttpStatus { url: String, status: u16 },

    // ── Resolution ──────────────────────────────────────
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("No applicable version: {0}")]
    NoApplicableVersion(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("{name} does not allow third-party distribution of file {file_id}")]
    DistributionRestricted { name: String, file_id: u64 },

    // ── Integrity ───────────────────────────────────────
    #[error("SHA-1 mismatch for {path:?}: expected {expected}, got {actual}")]
    Sha1Mismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    /// A required pack file failed; `source` is shared with every entry
    /// that targeted the same destination.
    #[error("Failed to download {rel_path}: {source}")]
    Download {
        rel_path: String,
        source: Arc<InstallerError>,
    },

    // ── Loader ──────────────────────────────────────────
    #[error("{installer} installer failed (code {code:?})\n{log}")]
    ExternalInstaller {
        installer: String,
        code: Option<i32>,
        log: String,
    },

    // ── Formats ─────────────────────────────────────────
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("XML parse error: {0}")]
    Xml(#[from] quick_xml::DeError),

    #[error("Zip extraction error: {0}")]
    Zip(#[from] zip::result::ZipError),

    // ── Generic ─────────────────────────────────────────
    #[error("{0}")]
    Other(String),
}

/// Convenience alias used throughout the crate.
pub type InstallerResult<T> = Result<T, InstallerError>;

// ── Exit codes ──────────────────────────────────────────
pub const EXIT_FAILURE: i32 = 1;
pub const EXIT_INVALID_PARAMETER: i32 = 2;
pub const EXIT_NO_APPLICABLE_VERSION: i32 = 3;
pub const EXIT_EXTERNAL_INSTALLER: i32 = 5;
pub const EXIT_HTTP_NOT_FOUND: i32 = 40;
pub const EXIT_HTTP_CLIENT_ERROR: i32 = 41;
pub const EXIT_HTTP_RATE_LIMITED: i32 = 42;
pub const EXIT_HTTP_FORBIDDEN: i32 = 43;
pub const EXIT_HTTP_SERVER_ERROR: i32 = 50;

impl InstallerError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        InstallerError::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether a retry of the same request may succeed.
    /// Only the fetcher consults this; the pipeline never retries on its own.
    pub fn is_transient(&self) -> bool {
        match self {
            InstallerError::Http(e) => e.is_timeout() || e.is_connect() || e.is_body(),
            InstallerError::HttpStatus { status, .. } => *status == 429 || *status >= 500,
            InstallerError::Download { source, .. } => source.is_transient(),
            _ => false,
        }
    }

    /// Process exit code for a terminal error.
    pub fn exit_code(&self) -> i32 {
        match self {
            InstallerError::NotFound(_) => EXIT_HTTP_NOT_FOUND,
            InstallerError::NoApplicableVersion(_) => EXIT_NO_APPLICABLE_VERSION,
            InstallerError::InvalidParameter(_) => EXIT_INVALID_PARAMETER,
            InstallerError::ExternalInstaller { .. } => EXIT_EXTERNAL_INSTALLER,
            InstallerError::Download { source, .. } => source.exit_code(),
            InstallerError::HttpStatus { status, .. } => match *status {
                404 => EXIT_HTTP_NOT_FOUND,
                429 => EXIT_HTTP_RATE_LIMITED,
                403 => EXIT_HTTP_FORBIDDEN,
                400..=499 => EXIT_HTTP_CLIENT_ERROR,
                _ => EXIT_HTTP_SERVER_ERROR,
            },
            InstallerError::Http(e) => match e.status().map(|s| s.as_u16()) {
                Some(404) => EXIT_HTTP_NOT_FOUND,
                Some(429) => EXIT_HTTP_RATE_LIMITED,
                Some(403) => EXIT_HTTP_FORBIDDEN,
                Some(400..=499) => EXIT_HTTP_CLIENT_ERROR,
                Some(_) => EXIT_HTTP_SERVER_ERROR,
                None => EXIT_FAILURE,
            },
            _ => EXIT_FAILURE,
        }
    }
}

impl From<std::io::Error> for InstallerError {
    fn from(source: std::io::Error) -> Self {
        InstallerError::Io {
            path: PathBuf::new(),
            source,
        }
    }
}
