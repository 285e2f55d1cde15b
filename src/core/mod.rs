// ─── Modpack Installer Core ───
// Installation reconciliation engine for game server file trees.
//
// Architecture:
//   core/
//     cache/         TTL-bounded disk cache of upstream API answers
//     filter/        Server-side include/exclude decisions per pack file
//     overrides/     Override extraction with world-data protection
//     manifest/      Per-target file manifests + stale-file pruning
//     version/       Package references + version resolution
//     platforms/     Modrinth and CurseForge API clients
//     modpack/       .mrpack and CurseForge pack formats
//     loaders/       Forge, NeoForge, Fabric, Quilt server installers
//     maven/         Maven coordinates + metadata listings
//     downloader/    Fetcher capability, retrying HTTP client, download pool
//     java/          Java binary lookup + installer subprocesses
//     state/         Settings and shared runtime objects per invocation
//     orchestrator   Modpack pipeline tying the above together
//     copy           Scoped multi-source copy

pub mod archive;
pub mod cache;
pub mod copy;
pub mod downloader;
pub mod error;
pub mod filter;
pub mod http;
pub mod java;
pub mod loaders;
pub mod manifest;
pub mod maven;
pub mod modpack;
pub mod orchestrator;
pub mod overrides;
pub mod platforms;
pub mod results;
pub mod state;
pub mod version;
