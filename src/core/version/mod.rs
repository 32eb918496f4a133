pub mod manifest;
pub mod resolver;
pub mod rules;
pub mod version_file;

pub use manifest::{VersionEntry, VersionManifest, VERSION_MANIFEST_URL};
pub use resolver::{EffectiveDescriptor, VersionResolver};
pub use rules::{evaluate, evaluate_with_features, OsConstraint, Rule, RuleAction};
pub use version_file::{
    Argument, ArgumentValue, Arguments, ArtifactRef, AssetIndexRef, JavaVersionInfo,
    LibraryDownloads, LibraryEntry, VersionDescriptor, VersionDownloads,
};
