// ─── Library Downloads ───
// Turns descriptor libraries into download tasks, using the same
// coordinate-to-path rule the launch assembler reads them back with.

use std::collections::HashSet;
use std::path::PathBuf;

use tracing::{debug, warn};

use crate::core::downloader::{BatchReport, DownloadTask, Downloader, ProgressFn};
use crate::core::error::LauncherResult;
use crate::core::instance::InstanceLayout;
use crate::core::maven::MavenArtifact;
use crate::core::platform::Platform;
use crate::core::version::LibraryEntry;

/// Library families that upstream republishes without updating checksums.
/// A mismatch on these is logged and accepted.
const TOLERATED_SHA1_FAMILIES: &[&str] = &[
    "text2speech",
    "realms",
    "lwjgl",
    "jemalloc",
    "joml",
    "jinput",
    "jorbis",
    "paulscode",
];

fn sha1_tolerated(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    TOLERATED_SHA1_FAMILIES.iter().any(|family| lower.contains(family))
}

#[derive(Debug, Default)]
pub struct LibraryPlan {
    pub tasks: Vec<DownloadTask>,
    /// Files fetched without verification, with their published SHA-1.
    pub tolerated: Vec<(PathBuf, String)>,
}

/// Plan downloads for every library that contributes on `platform`:
/// the primary jar and, when declared, this platform's natives jar.
///
/// `default_repo` is used for coordinate-only entries with no `url`.
pub fn plan_library_downloads(
    libraries: &[LibraryEntry],
    layout: &InstanceLayout,
    platform: &Platform,
    default_repo: Option<&str>,
) -> LauncherResult<LibraryPlan> {
    let mut plan = LibraryPlan::default();
    let mut seen = HashSet::new();

    for library in libraries {
        if !library.contributes(platform) {
            debug!("Skipping library {} on {}", library.name, platform.os);
            continue;
        }
        let library = with_default_repo(library, default_repo);
        let tolerated = sha1_tolerated(&library.name);

        if library.has_primary_artifact() {
            let dest = layout.library_path(library.artifact_path()?);
            let sha1 = library.artifact_sha1().map(str::to_string);
            push_task(&mut plan, &mut seen, library.artifact_url()?, dest, sha1, tolerated);
        }

        if let Some(relative) = library.native_path(platform)? {
            let dest = layout.library_path(relative);
            let (url, sha1) = match library.native_artifact(platform) {
                Some(artifact) if !artifact.url.is_empty() => {
                    (artifact.url.clone(), artifact.sha1.clone())
                }
                _ => {
                    let mut artifact = MavenArtifact::parse(&library.name)?;
                    artifact.classifier = library.native_classifier(platform);
                    let repo = library
                        .url
                        .as_deref()
                        .unwrap_or(crate::core::maven::MOJANG_LIBRARIES);
                    (artifact.url(repo), None)
                }
            };
            push_task(&mut plan, &mut seen, url, dest, sha1, tolerated);
        }
    }
    Ok(plan)
}

fn with_default_repo(library: &LibraryEntry, default_repo: Option<&str>) -> LibraryEntry {
    let mut library = library.clone();
    if library.url.is_none() {
        library.url = default_repo.map(str::to_string);
    }
    library
}

fn push_task(
    plan: &mut LibraryPlan,
    seen: &mut HashSet<PathBuf>,
    url: String,
    dest: PathBuf,
    sha1: Option<String>,
    tolerated: bool,
) {
    if !seen.insert(dest.clone()) {
        return;
    }
    match (sha1, tolerated) {
        (Some(sha1), true) => {
            plan.tolerated.push((dest.clone(), sha1));
            plan.tasks.push(DownloadTask::new(url, dest));
        }
        (sha1, _) => plan.tasks.push(DownloadTask::new(url, dest).with_sha1(sha1)),
    }
}

/// Library files (primary and natives) that are absent or empty on disk.
pub fn missing_library_files(
    libraries: &[LibraryEntry],
    layout: &InstanceLayout,
    platform: &Platform,
) -> LauncherResult<Vec<PathBuf>> {
    let plan = plan_library_downloads(libraries, layout, platform, None)?;
    Ok(plan
        .tasks
        .into_iter()
        .map(|task| task.dest)
        .filter(|dest| !std::fs::metadata(dest).map_or(false, |m| m.is_file() && m.len() > 0))
        .collect())
}

/// Download every library through the pool, then report tolerated
/// checksum mismatches.
pub async fn install_libraries(
    downloader: &Downloader,
    libraries: &[LibraryEntry],
    layout: &InstanceLayout,
    platform: &Platform,
    default_repo: Option<&str>,
    pool_size: usize,
    progress: Option<ProgressFn>,
) -> LauncherResult<BatchReport> {
    let plan = plan_library_downloads(libraries, layout, platform, default_repo)?;
    let report = downloader.fetch_all(plan.tasks, pool_size, progress).await?;

    for (path, expected) in &plan.tolerated {
        if !Downloader::validate_sha1(path, expected).await.unwrap_or(false) {
            warn!("Checksum mismatch tolerated for {:?} (expected {})", path, expected);
        }
    }
    Ok(report)
}
