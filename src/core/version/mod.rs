mod reference;
mod resolver;

pub use reference::{PackageRef, VersionSpec};
pub use resolver::{
    resolve, select_latest, ResolveOutcome, VersionRequest, PROJECT_ID, PROJECT_SLUG, VERSION_ID,
};
