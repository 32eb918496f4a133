// ─── Native Extractor ───
// Copies platform binaries out of natives jars into a per-launch directory.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::core::error::{LauncherError, LauncherResult};
use crate::core::platform::Platform;
use crate::core::version::EffectiveDescriptor;

use super::classpath::NATIVES_MARKER;

/// Arch markers that may follow a natives suffix, e.g. `natives-linux-arm64`.
const ARCH_MARKERS: &[&str] = &["arm64", "aarch64", "arm32", "x86"];

/// Extract native binaries for `platform` into `target_dir`.
///
/// `target_dir` is emptied first. Every natives jar under `libraries_root`
/// is considered, plus the descriptor's own declared classifier jars. A jar
/// that cannot be read is logged and skipped. Returns the number of files
/// written.
pub async fn extract(
    effective: &EffectiveDescriptor,
    libraries_root: &Path,
    target_dir: &Path,
    platform: &Platform,
) -> LauncherResult<usize> {
    reset_dir(target_dir).await?;

    let mut jars = declared_native_jars(effective, libraries_root, platform);
    let scanned = {
        let root = libraries_root.to_path_buf();
        tokio::task::spawn_blocking(move || scan_native_jars(&root))
            .await
            .map_err(|e| LauncherError::Other(format!("natives scan failed: {e}")))?
    };
    jars.extend(select_for_platform(scanned, platform));

    let extensions = platform.os.native_extensions();
    let mut written = 0;
    for jar in jars {
        let dest = target_dir.to_path_buf();
        let source = jar.clone();
        let result = tokio::task::spawn_blocking(move || copy_native_entries(&source, &dest, extensions))
            .await
            .map_err(|e| LauncherError::Other(format!("natives extraction task failed: {e}")))?;
        match result {
            Ok(count) => {
                debug!("Extracted {} native file(s) from {:?}", count, jar);
                written += count;
            }
            Err(e) => warn!("Skipping natives jar {:?}: {}", jar, e),
        }
    }

    info!("Extracted {} native file(s) into {:?}", written, target_dir);
    Ok(written)
}

async fn reset_dir(dir: &Path) -> LauncherResult<()> {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(LauncherError::io(dir, e)),
    }
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| LauncherError::io(dir, e))
}

/// Classifier jars the descriptor names for this platform and that exist.
fn declared_native_jars(
    effective: &EffectiveDescriptor,
    libraries_root: &Path,
    platform: &Platform,
) -> BTreeSet<PathBuf> {
    effective
        .libraries
        .iter()
        .filter(|lib| lib.is_allowed(platform))
        .filter_map(|lib| lib.native_path(platform).ok().flatten())
        .map(|relative| libraries_root.join(relative))
        .filter(|path| path.is_file())
        .collect()
}

/// Every `.jar` under `root` whose name carries the natives marker.
fn scan_native_jars(root: &Path) -> Vec<PathBuf> {
    let mut found = Vec::new();
    let mut stack = vec![root.to_path_buf()];

    while let Some(dir) = stack.pop() {
        let Ok(entries) = std::fs::read_dir(&dir) else {
            continue;
        };
        for entry in entries.filter_map(Result::ok) {
            let Ok(file_type) = entry.file_type() else {
                continue;
            };
            let path = entry.path();
            if file_type.is_dir() {
                stack.push(path);
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            if file_type.is_file() && name.ends_with(".jar") && name.contains(NATIVES_MARKER) {
                found.push(path);
            }
        }
    }
    found.sort();
    found
}

/// Keep jars built for this platform. When none match, every natives jar is
/// used.
fn select_for_platform(jars: Vec<PathBuf>, platform: &Platform) -> Vec<PathBuf> {
    let matching: Vec<PathBuf> = jars
        .iter()
        .filter(|jar| jar_matches_platform(jar, platform))
        .cloned()
        .collect();
    if matching.is_empty() {
        if !jars.is_empty() {
            warn!(
                "No natives jar names {:?}; using all {} natives jars",
                platform.os.native_suffixes(),
                jars.len()
            );
        }
        return jars;
    }
    matching
}

fn jar_matches_platform(jar: &Path, platform: &Platform) -> bool {
    let name = jar
        .file_name()
        .map(|n| n.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    let stem = name.trim_end_matches(".jar");

    platform.os.native_suffixes().iter().any(|suffix| {
        let Some(index) = stem.find(suffix) else {
            return false;
        };
        let rest = stem[index + suffix.len()..].trim_start_matches('-');
        match ARCH_MARKERS.iter().find(|m| rest.starts_with(*m)) {
            Some(marker) => platform.arch_matches(marker),
            None => true,
        }
    })
}

/// Copy every native binary in `jar` into `dest`, flattened to its file name.
fn copy_native_entries(jar: &Path, dest: &Path, extensions: &[&str]) -> LauncherResult<usize> {
    let file = std::fs::File::open(jar).map_err(|e| LauncherError::io(jar, e))?;
    let mut archive = zip::ZipArchive::new(file)?;
    let mut copied = 0;

    for index in 0..archive.len() {
        let mut entry = archive.by_index(index)?;
        if entry.is_dir() || entry.name().starts_with("META-INF") {
            continue;
        }
        let Some(file_name) = Path::new(entry.name())
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
        else {
            continue;
        };
        let is_native = Path::new(&file_name)
            .extension()
            .and_then(|e| e.to_str())
            .map_or(false, |ext| extensions.contains(&ext));
        if !is_native {
            continue;
        }

        let out_path = dest.join(&file_name);
        let mut out = std::fs::File::create(&out_path).map_err(|e| LauncherError::io(&out_path, e))?;
        std::io::copy(&mut entry, &mut out).map_err(|e| LauncherError::io(&out_path, e))?;
        copied += 1;
    }
    Ok(copied)
}
