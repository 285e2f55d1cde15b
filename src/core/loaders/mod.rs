pub mod context;
mod dispatch;
pub mod fabric;
pub mod forge;
pub mod installer;
pub mod neoforge;
pub mod quilt;
mod scrape;
mod spec;

pub use context::InstallContext;
pub use dispatch::{install_loader, LoaderOutcome};
pub use installer::{Installer, LoaderInstallResult, LoaderInstaller};
pub use spec::{LoaderKind, LoaderRequest, LoaderSpec};
