// ─── Blocklaunch Core ───
// Launcher backend: turns version descriptors into a running game and
// installs everything those descriptors reference.
//
// Architecture:
//   core/
//     version/    — Manifest, descriptors, OS rules, inheritance resolver
//     launch/     — Classpath/modulepath, natives, argument templates, spawn
//     install/    — Staged install pipeline with events and locking
//     loaders/    — Base game, Fabric and Forge installers
//     content/    — Modpack archives and mod lists
//     assets/     — Asset index + object downloads
//     downloader/ — Retrying fetches and the bounded download pool
//     archive/    — zip/tar.gz/rar/7z extraction with root flattening
//     java/       — Java probing and managed runtimes
//     instance/   — On-disk layout and install locks
//     maven/      — Coordinate parsing and repository paths
//     state/      — Settings and the shared launcher context

pub mod archive;
pub mod assets;
pub mod auth;
pub mod content;
pub mod downloader;
pub mod error;
pub mod http;
pub mod install;
pub mod instance;
pub mod java;
pub mod launch;
pub mod loaders;
pub mod maven;
pub mod platform;
pub mod state;
pub mod version;
