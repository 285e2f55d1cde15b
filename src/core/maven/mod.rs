mod artifact;
mod metadata;

pub use artifact::{metadata_url, MavenArtifact};
pub use metadata::MavenMetadata;

/// Maven repositories serving loader installers.
pub const FORGE_MAVEN: &str = "https://maven.minecraftforge.net";
pub const NEOFORGE_MAVEN: &str = "https://maven.neoforged.net/releases";
pub const QUILT_MAVEN: &str = "https://maven.quiltmc.org/repository/release";
