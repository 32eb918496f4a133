// ─── Java Runtime ───
// Picks a Java binary for a required major version: the configured one
// when it is new enough, else a managed runtime under `runtime/java-<n>/`,
// downloaded from Adoptium on first use.

use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::core::archive;
use crate::core::downloader::Downloader;
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::instance::FileLock;
use crate::core::platform::{OsName, Platform};
use crate::core::state::LauncherContext;

use super::probe::{probe_java, JavaInstallation};

const RUNTIME_MARKER_FILE: &str = "runtime.json";
const MIN_FREE_DISK_BYTES: u64 = 512 * 1024 * 1024;

/// Written next to a managed runtime once it has been probed.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RuntimeMetadata {
    major: u32,
    version: String,
    vendor: String,
    java_path: PathBuf,
    installed_at: String,
}

/// Where the selected runtime came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeSource {
    Configured,
    Managed,
    Downloaded,
}

#[derive(Debug, Clone)]
pub struct SelectedRuntime {
    pub java: PathBuf,
    pub major: u32,
    pub source: RuntimeSource,
}

/// Required Java major for a game version id when no descriptor says so.
pub fn required_java_for_minecraft_version(minecraft_version: &str) -> u32 {
    let lower = minecraft_version.to_ascii_lowercase();
    if let Some(week_pos) = lower.find('w') {
        let year_hint = &lower[..week_pos];
        if year_hint.len() >= 2 {
            if let Ok(year) = year_hint[year_hint.len() - 2..].parse::<u32>() {
                return if year >= 24 { 21 } else { 17 };
            }
        }
    }

    let mut parts = minecraft_version.split(['.', '-']);
    let major = parts.next().and_then(|p| p.parse::<u32>().ok()).unwrap_or(1);
    let minor = parts.next().and_then(|p| p.parse::<u32>().ok()).unwrap_or(20);
    let patch = parts.next().and_then(|p| p.parse::<u32>().ok()).unwrap_or(0);

    if major > 1 || minor >= 21 || (minor == 20 && patch >= 5) {
        21
    } else if minor >= 18 {
        17
    } else if minor == 17 {
        16
    } else {
        8
    }
}

/// Adoptium binary endpoint for the latest GA JDK of `major`.
pub fn adoptium_url(base: &str, major: u32, platform: &Platform) -> String {
    format!(
        "{}/v3/binary/latest/{}/ga/{}/{}/jdk/hotspot/normal/eclipse",
        base.trim_end_matches('/'),
        major,
        platform.os.adoptium_name(),
        platform.adoptium_arch()
    )
}

fn archive_file_name(major: u32, os: OsName) -> String {
    match os {
        OsName::Windows => format!("java-{major}.zip"),
        _ => format!("java-{major}.tar.gz"),
    }
}

pub fn java_exe(os: OsName) -> &'static str {
    match os {
        OsName::Windows => "java.exe",
        _ => "java",
    }
}

/// The java binary inside an extracted runtime: `bin/java`, the macOS
/// bundle layout, or the first match found by an iterative walk.
pub fn locate_java_binary(runtime_root: &Path, os: OsName) -> PathBuf {
    let exe = java_exe(os);
    let primary = runtime_root.join("bin").join(exe);
    if primary.is_file() {
        return primary;
    }
    let mac_layout = runtime_root.join("Contents").join("Home").join("bin").join(exe);
    if mac_layout.is_file() {
        return mac_layout;
    }

    let mut stack = vec![runtime_root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let Ok(entries) = std::fs::read_dir(&dir) else {
            continue;
        };
        for entry in entries.filter_map(Result::ok) {
            let path = entry.path();
            match entry.file_type() {
                Ok(t) if t.is_dir() => stack.push(path),
                Ok(t) if t.is_file() && entry.file_name() == exe => {
                    if path.parent().and_then(|p| p.file_name()).map_or(false, |n| n == "bin") {
                        return path;
                    }
                }
                _ => {}
            }
        }
    }
    primary
}

/// The managed runtime's binary when it is installed and at least
/// `required_major`.
pub fn managed_runtime(runtime_root: &Path, required_major: u32) -> Option<PathBuf> {
    let raw = std::fs::read(runtime_root.join(RUNTIME_MARKER_FILE)).ok()?;
    let metadata: RuntimeMetadata = serde_json::from_slice(&raw).ok()?;
    if metadata.major < required_major {
        return None;
    }
    let usable = std::fs::metadata(&metadata.java_path).map_or(false, |m| m.is_file() && m.len() > 0);
    usable.then_some(metadata.java_path)
}

/// Select (and if necessary download) a runtime for `required_major`.
pub async fn ensure_runtime(
    ctx: &LauncherContext,
    downloader: &Downloader,
    required_major: u32,
    progress: &(dyn Fn(u8) + Send + Sync),
) -> LauncherResult<SelectedRuntime> {
    if let Some(configured) = &ctx.config.java_path {
        match probe_java(configured).await {
            Some(java) if java.major >= required_major => {
                info!("Using configured Java {} at {:?}", java.version, configured);
                progress(100);
                return Ok(SelectedRuntime {
                    java: configured.clone(),
                    major: java.major,
                    source: RuntimeSource::Configured,
                });
            }
            Some(java) => warn!(
                "Configured Java {:?} is {} but {} is required; using a managed runtime",
                configured, java.major, required_major
            ),
            None => warn!("Configured Java {:?} could not be probed", configured),
        }
    }

    let runtime_root = ctx.layout.runtime_dir(required_major);
    if let Some(java) = managed_runtime(&runtime_root, required_major) {
        info!("Managed Java {} already installed at {:?}", required_major, java);
        progress(100);
        return Ok(SelectedRuntime {
            java,
            major: required_major,
            source: RuntimeSource::Managed,
        });
    }

    let lock_path = runtime_root.with_extension("lock");
    let _lock = FileLock::acquire(&lock_path, downloader.cancellation()).await?;
    // Another process may have finished the install while we waited.
    if let Some(java) = managed_runtime(&runtime_root, required_major) {
        progress(100);
        return Ok(SelectedRuntime {
            java,
            major: required_major,
            source: RuntimeSource::Managed,
        });
    }

    let installed = install_runtime(ctx, downloader, required_major, &runtime_root, progress).await?;
    progress(100);
    Ok(SelectedRuntime {
        java: installed.path,
        major: installed.major,
        source: RuntimeSource::Downloaded,
    })
}

async fn install_runtime(
    ctx: &LauncherContext,
    downloader: &Downloader,
    required_major: u32,
    runtime_root: &Path,
    progress: &(dyn Fn(u8) + Send + Sync),
) -> LauncherResult<JavaInstallation> {
    let platform = &ctx.platform;
    let temp_dir = ctx.layout.temp_dir();
    tokio::fs::create_dir_all(&temp_dir)
        .await
        .map_err(|e| LauncherError::io(&temp_dir, e))?;
    ensure_min_disk_space(&temp_dir, MIN_FREE_DISK_BYTES)?;

    let url = adoptium_url(&ctx.config.endpoints.adoptium, required_major, platform);
    let archive_path = temp_dir.join(archive_file_name(required_major, platform.os));
    info!("Downloading Java {} from {}", required_major, url);
    progress(5);
    downloader.fetch(&url, &archive_path).await?;
    progress(60);

    match tokio::fs::remove_dir_all(runtime_root).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(LauncherError::io(runtime_root, e)),
    }
    let extracted = archive::extract_and_normalize(&archive_path, runtime_root).await;
    if let Err(e) = tokio::fs::remove_file(&archive_path).await {
        warn!("Could not remove runtime archive {:?}: {}", archive_path, e);
    }
    extracted?;
    progress(85);

    let java_bin = locate_java_binary(runtime_root, platform.os);
    ensure_executable(&java_bin)?;

    let java = probe_java(&java_bin).await.ok_or_else(|| {
        LauncherError::Java(format!("downloaded runtime at {} does not run", java_bin.display()))
    })?;
    if java.major < required_major {
        return Err(LauncherError::Java(format!(
            "downloaded runtime reports Java {} but {} is required",
            java.major, required_major
        )));
    }

    let metadata = RuntimeMetadata {
        major: java.major,
        version: java.version.clone(),
        vendor: java.vendor.clone(),
        java_path: java_bin.clone(),
        installed_at: Utc::now().to_rfc3339(),
    };
    let marker = runtime_root.join(RUNTIME_MARKER_FILE);
    std::fs::write(&marker, serde_json::to_vec_pretty(&metadata)?)
        .map_err(|e| LauncherError::io(&marker, e))?;

    info!("Installed Java {} ({}) at {:?}", java.version, java.vendor, java_bin);
    Ok(JavaInstallation {
        path: java_bin,
        ..java
    })
}

fn ensure_executable(java_bin: &Path) -> LauncherResult<()> {
    if !java_bin.is_file() {
        return Err(LauncherError::Java(format!(
            "no java binary in extracted runtime (looked for {})",
            java_bin.display()
        )));
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(java_bin, std::fs::Permissions::from_mode(0o755))
            .map_err(|e| LauncherError::io(java_bin, e))?;
    }
    Ok(())
}

fn ensure_min_disk_space(path: &Path, minimum_bytes: u64) -> LauncherResult<()> {
    let disks = sysinfo::Disks::new_with_refreshed_list();
    let canonical = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    let mut best_len = 0usize;
    let mut available = None;
    for disk in disks.list() {
        let mount = disk.mount_point();
        if canonical.starts_with(mount) {
            let len = mount.as_os_str().len();
            if len >= best_len {
                best_len = len;
                available = Some(disk.available_space());
            }
        }
    }
    match available {
        Some(bytes) if bytes < minimum_bytes => Err(LauncherError::Java(format!(
            "not enough disk space for a runtime: {bytes} bytes free, {minimum_bytes} required"
        ))),
        _ => Ok(()),
    }
}
