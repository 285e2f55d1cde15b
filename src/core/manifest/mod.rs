mod model;
mod reconcile;

pub use model::{InstallManifest, ManifestKind};
pub use reconcile::{reconcile, ReconcileReport};
