mod app_state;

pub use app_state::{InstallerSettings, InstallerState, DEFAULT_CONCURRENT_DOWNLOADS};
