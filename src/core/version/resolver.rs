// ─── Version Resolver ───
// Walks an `inheritsFrom` chain on disk and produces the effective
// descriptor the launch assembler works from.

use std::collections::HashSet;
use std::path::PathBuf;

use tracing::debug;

use crate::core::error::{LauncherError, LauncherResult};
use crate::core::instance::InstanceLayout;

use super::version_file::{
    Argument, Arguments, ArtifactRef, AssetIndexRef, LibraryEntry, VersionDescriptor,
};

/// A descriptor with its inheritance chain flattened.
#[derive(Debug, Clone)]
pub struct EffectiveDescriptor {
    /// Id of the requested (leaf) descriptor.
    pub id: String,
    /// Ids from the leaf up to the root, leaf first.
    pub chain: Vec<String>,
    pub main_class: String,
    /// Root libraries first, then each child's own, in chain order.
    pub libraries: Vec<LibraryEntry>,
    pub jvm_arguments: Vec<Argument>,
    pub game_arguments: Vec<Argument>,
    /// Legacy argument string, when the effective templates are legacy.
    pub legacy_arguments: Option<String>,
    pub asset_index: Option<AssetIndexRef>,
    pub client: Option<ArtifactRef>,
    pub java_major: u32,
    pub version_type: String,
}

impl EffectiveDescriptor {
    /// The base game id (root of the chain).
    pub fn base_id(&self) -> &str {
        self.chain.last().map(String::as_str).unwrap_or(&self.id)
    }

    pub fn inherits(&self) -> bool {
        self.chain.len() > 1
    }

    pub fn is_legacy(&self) -> bool {
        self.legacy_arguments.is_some()
    }
}

pub struct VersionResolver<'a> {
    layout: &'a InstanceLayout,
}

impl<'a> VersionResolver<'a> {
    pub fn new(layout: &'a InstanceLayout) -> Self {
        Self { layout }
    }

    /// Load a single descriptor, failing with `MissingDependency` if absent.
    pub fn load(&self, id: &str) -> LauncherResult<VersionDescriptor> {
        let path = self.layout.version_json(id);
        if !path.is_file() {
            return Err(LauncherError::MissingDependency { paths: vec![path] });
        }
        VersionDescriptor::load(&path)
    }

    /// Resolve `id` and every ancestor into one effective descriptor.
    pub fn resolve(&self, id: &str) -> LauncherResult<EffectiveDescriptor> {
        let mut chain: Vec<VersionDescriptor> = Vec::new();
        let mut seen = HashSet::new();
        let mut next = Some(id.to_string());

        while let Some(current) = next.take() {
            if !seen.insert(current.clone()) {
                return Err(LauncherError::InheritanceCycle(current));
            }
            let descriptor = self.load(&current)?;
            debug!(
                "Loaded descriptor {} (inheritsFrom={:?})",
                current, descriptor.inherits_from
            );
            next = descriptor.inherits_from.clone();
            chain.push(descriptor);
        }

        Ok(merge_chain(id, chain))
    }

    /// Absolute client jar paths for the resolved chain: base jar first,
    /// then the leaf's own jar when it exists on disk.
    pub fn client_jars(&self, effective: &EffectiveDescriptor) -> Vec<PathBuf> {
        let mut jars = vec![self.layout.version_jar(effective.base_id())];
        if effective.inherits() {
            let own = self.layout.version_jar(&effective.id);
            if own.exists() {
                jars.push(own);
            }
        }
        jars
    }
}

/// Merge a leaf-first chain.
///
/// Libraries concatenate root-first with no coordinate de-duplication.
/// Asset index, client download and java version come from the nearest
/// descriptor that declares them. Argument lists are never concatenated:
/// each list comes whole from the nearest descriptor with a non-empty one.
fn merge_chain(id: &str, chain: Vec<VersionDescriptor>) -> EffectiveDescriptor {
    let ids: Vec<String> = chain.iter().map(|d| d.id.clone()).collect();

    let main_class = chain
        .iter()
        .map(|d| d.main_class.trim())
        .find(|m| !m.is_empty())
        .unwrap_or_default()
        .to_string();

    let libraries = chain
        .iter()
        .rev()
        .flat_map(|d| d.libraries.iter().cloned())
        .collect();

    let asset_index = chain.iter().find_map(|d| d.asset_index.clone());
    let client = chain.iter().find_map(|d| d.client_artifact().cloned());
    let java_major = chain
        .iter()
        .find_map(|d| d.java_version.as_ref().map(|j| j.major_version))
        .unwrap_or(17);
    let version_type = chain
        .iter()
        .find_map(|d| d.version_type.clone())
        .unwrap_or_else(|| "release".to_string());

    let templates = chain.iter().find(|d| d.has_argument_templates());
    let (jvm_arguments, game_arguments, legacy_arguments) = match templates {
        Some(d) if d.arguments.is_some() => {
            let pick = |select: fn(&Arguments) -> &Vec<Argument>| {
                chain
                    .iter()
                    .filter_map(|d| d.arguments.as_ref())
                    .map(select)
                    .find(|list| !list.is_empty())
                    .cloned()
                    .unwrap_or_default()
            };
            (pick(|a| &a.jvm), pick(|a| &a.game), None)
        }
        Some(d) => (Vec::new(), Vec::new(), d.minecraft_arguments.clone()),
        None => (Vec::new(), Vec::new(), None),
    };

    EffectiveDescriptor {
        id: id.to_string(),
        chain: ids,
        main_class,
        libraries,
        jvm_arguments,
        game_arguments,
        legacy_arguments,
        asset_index,
        client,
        java_major,
        version_type,
    }
}
