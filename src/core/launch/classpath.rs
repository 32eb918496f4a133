// ─── Classpath Builder ───
// Turns an effective descriptor into the ordered, de-duplicated jar lists
// passed to the JVM, split between classpath and module path.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::core::error::{LauncherError, LauncherResult};
use crate::core::instance::InstanceLayout;
use crate::core::platform::Platform;
use crate::core::version::{EffectiveDescriptor, VersionResolver};

/// Jar name prefixes that belong on the module path.
const MODULE_PREFIXES: &[&str] = &[
    "bootstraplauncher",
    "securejarhandler",
    "asm",
    "asm-commons",
    "asm-util",
    "asm-analysis",
    "asm-tree",
    "JarJarFileSystems",
];

/// Main classes that boot through the module layer.
const MODULE_BOOTSTRAP_MAIN_CLASSES: &[&str] = &["cpw.mods.bootstraplauncher.BootstrapLauncher"];

/// File-name marker of native classifier jars.
pub const NATIVES_MARKER: &str = "natives";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedLibrarySet {
    pub classpath: Vec<PathBuf>,
    pub modulepath: Vec<PathBuf>,
}

impl ResolvedLibrarySet {
    pub fn classpath_string(&self, separator: &str) -> String {
        join_paths(&self.classpath, separator)
    }

    pub fn modulepath_string(&self, separator: &str) -> String {
        join_paths(&self.modulepath, separator)
    }
}

/// Whether a jar file name belongs on the module path.
///
/// A prefix matches only when followed by `-<digit>`, so `asm` does not
/// claim `asm-commons-9.5.jar`.
pub fn is_module_jar(file_name: &str) -> bool {
    MODULE_PREFIXES.iter().any(|prefix| {
        file_name
            .strip_prefix(prefix)
            .and_then(|rest| rest.strip_prefix('-'))
            .and_then(|rest| rest.chars().next())
            .map_or(false, |c| c.is_ascii_digit())
    })
}

/// Whether the descriptor boots through the module layer. Descriptors that
/// do not get every jar on the plain classpath.
pub fn uses_module_layer(effective: &EffectiveDescriptor) -> bool {
    MODULE_BOOTSTRAP_MAIN_CLASSES.contains(&effective.main_class.as_str())
}

/// Assemble the classpath and module path for `effective`.
///
/// Fails with `MissingDependency` listing every absent file; nothing is
/// returned for a partially installed version.
pub fn assemble(
    effective: &EffectiveDescriptor,
    layout: &InstanceLayout,
    platform: &Platform,
) -> LauncherResult<ResolvedLibrarySet> {
    let module_layer = uses_module_layer(effective);
    let mut set = ResolvedLibrarySet::default();
    let mut missing = Vec::new();

    let client_jars = VersionResolver::new(layout).client_jars(effective);
    for jar in client_jars {
        if jar.is_file() {
            set.classpath.push(jar);
        } else {
            missing.push(jar);
        }
    }

    for library in &effective.libraries {
        if !library.contributes(platform) || !library.has_primary_artifact() {
            debug!("Library {} not used on {}", library.name, platform.os);
            continue;
        }
        let path = layout.library_path(library.artifact_path()?);
        if !path.is_file() {
            missing.push(path);
            continue;
        }

        let file_name = file_name_of(&path);
        if file_name.contains(NATIVES_MARKER) {
            continue;
        }
        if module_layer && is_module_jar(&file_name) {
            set.modulepath.push(path);
        } else {
            set.classpath.push(path);
        }
    }

    if !missing.is_empty() {
        dedup_preserving_order(&mut missing);
        warn!(
            "{} file(s) missing for {}: {:?}",
            missing.len(),
            effective.id,
            missing
        );
        return Err(LauncherError::MissingDependency { paths: missing });
    }

    dedup_preserving_order(&mut set.modulepath);
    dedup_preserving_order(&mut set.classpath);
    let on_module_path: HashSet<PathBuf> = set.modulepath.iter().map(|p| path_key(p)).collect();
    set.classpath.retain(|p| !on_module_path.contains(&path_key(p)));

    debug!(
        "Resolved {} classpath and {} module path entries for {}",
        set.classpath.len(),
        set.modulepath.len(),
        effective.id
    );
    Ok(set)
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn path_key(path: &Path) -> PathBuf {
    if cfg!(target_os = "windows") {
        PathBuf::from(path.to_string_lossy().to_lowercase())
    } else {
        path.to_path_buf()
    }
}

fn dedup_preserving_order(entries: &mut Vec<PathBuf>) {
    let mut seen = HashSet::new();
    entries.retain(|entry| seen.insert(path_key(entry)));
}

fn join_paths(paths: &[PathBuf], separator: &str) -> String {
    paths
        .iter()
        .map(|p| safe_path_str(p))
        .collect::<Vec<_>>()
        .join(separator)
}

/// Path as a launch-argument string. Windows extended-length prefixes are
/// stripped because the JVM mis-resolves them on the classpath.
pub fn safe_path_str(path: &Path) -> String {
    let text = path.to_string_lossy().to_string();
    match text.strip_prefix(r"\\?\") {
        Some(stripped) if cfg!(target_os = "windows") => stripped.to_string(),
        _ => text,
    }
}
