use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};

use tokio::process::Command;
use tracing::{debug, info};

use crate::core::error::{InstallerError, InstallerResult};

/// `$JAVA_HOME/bin/java` when `JAVA_HOME` is set, otherwise `java` from `PATH`.
pub fn resolve_java_binary() -> PathBuf {
    java_from_home(std::env::var_os("JAVA_HOME"))
}

fn java_from_home(java_home: Option<OsString>) -> PathBuf {
    let exe = if cfg!(windows) { "java.exe" } else { "java" };
    match java_home.filter(|h| !h.is_empty()) {
        Some(home) => PathBuf::from(home).join("bin").join(exe),
        None => PathBuf::from(exe),
    }
}

/// Run `java -jar <jar> <args>` in `cwd` and return the combined output.
///
/// A non-zero exit becomes `ExternalInstaller` carrying the full log.
pub async fn run_java_jar<S: AsRef<OsStr>>(
    installer: &str,
    java: &Path,
    jar: &Path,
    args: &[S],
    cwd: &Path,
) -> InstallerResult<String> {
    info!("Running {} installer {:?}", installer, jar);

    let output = Command::new(java)
        .arg("-jar")
        .arg(jar)
        .args(args)
        .current_dir(cwd)
        .output()
        .await
        .map_err(|e| InstallerError::ExternalInstaller {
            installer: installer.to_string(),
            code: None,
            log: format!("failed to start {:?}: {}", java, e),
        })?;

    let log = format!(
        "{}\n{}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
    debug!("{} installer output:\n{}", installer, log);

    if !output.status.success() {
        return Err(InstallerError::ExternalInstaller {
            installer: installer.to_string(),
            code: output.status.code(),
            log,
        });
    }
    Ok(log)
}
