// ─── Content ───
// Optional last install stage: a modpack archive unpacked into the game
// directory, or a list of mod jars fetched into `mods/`.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::core::archive::extract_and_normalize;
use crate::core::downloader::{BatchReport, DownloadTask, Downloader, ProgressFn};
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::instance::InstanceLayout;

/// Written into the game directory once a modpack archive is unpacked.
pub const MODPACK_MARKER: &str = ".modpack.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ContentSpec {
    Modpack { url: String },
    Mods(Vec<ModEntry>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModEntry {
    #[serde(default)]
    pub name: Option<String>,
    pub url: String,
    #[serde(default)]
    pub file_name: Option<String>,
}

impl ModEntry {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            name: None,
            url: url.into(),
            file_name: None,
        }
    }

    /// Target file name inside `mods/`. Always a single path component.
    pub fn resolved_file_name(&self) -> LauncherResult<String> {
        let name = match self.file_name.as_deref() {
            Some(name) => name.to_string(),
            None => {
                let mut name = file_name_from_url(&self.url).ok_or_else(|| {
                    LauncherError::Other(format!(
                        "cannot derive a file name for mod {}",
                        self.name.as_deref().unwrap_or(&self.url)
                    ))
                })?;
                if !name.ends_with(".jar") {
                    name.push_str(".jar");
                }
                name
            }
        };
        validate_file_name(&name)?;
        Ok(name)
    }
}

/// Reject names that would land outside the directory they are joined to.
fn validate_file_name(name: &str) -> LauncherResult<()> {
    let trimmed = name.trim();
    let unsafe_name = trimmed.is_empty()
        || trimmed == "."
        || trimmed == ".."
        || name.contains(['/', '\\'])
        || name.contains(':')
        || Path::new(name).is_absolute();
    if unsafe_name {
        return Err(LauncherError::Other(format!("unsafe mod file name {name:?}")));
    }
    Ok(())
}

#[derive(Debug, Serialize, Deserialize)]
struct ModpackMarker {
    url: String,
    files: usize,
    installed_at: DateTime<Utc>,
}

/// Last path segment of `url`, query and fragment dropped.
fn file_name_from_url(url: &str) -> Option<String> {
    let parsed = reqwest::Url::parse(url).ok()?;
    let segment = parsed.path_segments()?.filter(|s| !s.is_empty()).last()?;
    Some(segment.to_string())
}

fn dir_has_entries(dir: &Path) -> bool {
    std::fs::read_dir(dir).map_or(false, |mut entries| entries.next().is_some())
}

/// Whether `spec` is already in place for the game directory of `instance_id`.
pub fn content_installed(layout: &InstanceLayout, instance_id: &str, spec: &ContentSpec) -> bool {
    let mods = layout.mods_dir(instance_id);
    match spec {
        ContentSpec::Modpack { .. } => {
            layout.instance_dir(instance_id).join(MODPACK_MARKER).is_file()
                || dir_has_entries(&mods)
        }
        ContentSpec::Mods(entries) => entries.iter().all(|entry| {
            entry.resolved_file_name().map_or(false, |name| {
                std::fs::metadata(mods.join(name))
                    .map_or(false, |m| m.is_file() && m.len() > 0)
            })
        }),
    }
}

pub async fn install_content(
    downloader: &Downloader,
    layout: &InstanceLayout,
    instance_id: &str,
    spec: &ContentSpec,
    concurrency: usize,
    progress: Option<ProgressFn>,
) -> LauncherResult<()> {
    let game_dir = layout.instance_dir(instance_id);
    match spec {
        ContentSpec::Modpack { url } => {
            install_modpack(downloader, layout, &game_dir, url, progress).await
        }
        ContentSpec::Mods(mods) => {
            let report = install_mods(downloader, &game_dir, mods, concurrency, progress).await?;
            debug!(
                "Mods for {}: {} fetched, {} present",
                instance_id, report.downloaded, report.already_present
            );
            Ok(())
        }
    }
}

async fn install_modpack(
    downloader: &Downloader,
    layout: &InstanceLayout,
    game_dir: &Path,
    url: &str,
    progress: Option<ProgressFn>,
) -> LauncherResult<()> {
    let file_name = file_name_from_url(url).unwrap_or_else(|| "modpack.zip".to_string());
    let archive = layout.temp_dir().join(&file_name);
    info!("Downloading modpack {}", url);
    downloader.fetch(url, &archive).await?;
    if let Some(progress) = &progress {
        progress(1, 2);
    }

    let extracted = extract_and_normalize(&archive, game_dir).await;
    let _ = tokio::fs::remove_file(&archive).await;
    let files = extracted?;

    let marker = ModpackMarker {
        url: url.to_string(),
        files,
        installed_at: Utc::now(),
    };
    let marker_path = game_dir.join(MODPACK_MARKER);
    tokio::fs::write(&marker_path, serde_json::to_vec_pretty(&marker)?)
        .await
        .map_err(|e| LauncherError::io(&marker_path, e))?;
    if let Some(progress) = &progress {
        progress(2, 2);
    }
    info!("Modpack unpacked into {:?} ({} files)", game_dir, files);
    Ok(())
}

async fn install_mods(
    downloader: &Downloader,
    game_dir: &Path,
    mods: &[ModEntry],
    concurrency: usize,
    progress: Option<ProgressFn>,
) -> LauncherResult<BatchReport> {
    let dir = game_dir.join("mods");
    tokio::fs::create_dir_all(&dir)
        .await
        .map_err(|e| LauncherError::io(&dir, e))?;

    let tasks = mods
        .iter()
        .map(|entry| Ok(DownloadTask::new(entry.url.clone(), dir.join(entry.resolved_file_name()?))))
        .collect::<LauncherResult<Vec<_>>>()?;
    info!("Installing {} mod(s) into {:?}", tasks.len(), dir);
    downloader.fetch_all(tasks, concurrency, progress).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::downloader::testing::{Reply, TestOrigin};
    use crate::core::downloader::RetryPolicy;
    use std::io::Write;
    use std::time::Duration;
    use tempfile::TempDir;
    use zip::write::SimpleFileOptions;

    fn downloader() -> Downloader {
        Downloader::new(
            reqwest::Client::new(),
            RetryPolicy {
                max_attempts: 2,
                base_delay: Duration::from_millis(5),
            },
        )
    }

    fn modpack_zip() -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
        for (name, body) in [
            ("Pack v2/mods/sodium.jar", &b"sodium"[..]),
            ("Pack v2/config/sodium.json", &b"{}"[..]),
        ] {
            writer.start_file(name, SimpleFileOptions::default()).unwrap();
            writer.write_all(body).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn file_names_come_from_the_url_path() {
        let entry = ModEntry::new("https://cdn.example.com/files/4/fabric-api-0.92.jar?sig=abc");
        assert_eq!(entry.resolved_file_name().unwrap(), "fabric-api-0.92.jar");

        let entry = ModEntry::new("https://cdn.example.com/download/12345");
        assert_eq!(entry.resolved_file_name().unwrap(), "12345.jar");

        let mut entry = ModEntry::new("https://cdn.example.com/download/12345");
        entry.file_name = Some("lithium.jar".into());
        assert_eq!(entry.resolved_file_name().unwrap(), "lithium.jar");

        assert!(ModEntry::new("not a url").resolved_file_name().is_err());
    }

    #[test]
    fn file_names_cannot_escape_the_mods_dir() {
        for bad in ["", "  ", ".", "..", "../../x.jar", "sub/x.jar", r"..\x.jar", "/tmp/x.jar", r"C:\x.jar"] {
            let mut entry = ModEntry::new("https://cdn.example.com/files/ok.jar");
            entry.file_name = Some(bad.to_string());
            assert!(entry.resolved_file_name().is_err(), "accepted {bad:?}");
        }
    }

    #[tokio::test]
    async fn unsafe_file_name_fails_before_any_download() {
        let temp = TempDir::new().unwrap();
        let layout = InstanceLayout::new(temp.path());
        let origin = TestOrigin::start(|_, _| Reply::ok(b"payload".to_vec())).await;
        let mut entry = ModEntry::new(origin.url("/evil.jar"));
        entry.file_name = Some("../../evil.jar".into());
        let spec = ContentSpec::Mods(vec![entry]);

        let result = install_content(&downloader(), &layout, "pack", &spec, 2, None).await;

        assert!(result.is_err());
        assert_eq!(origin.hits(), 0);
        assert!(!temp.path().join("evil.jar").exists());
    }

    #[test]
    fn content_spec_reads_both_shapes() {
        let pack: ContentSpec =
            serde_json::from_str(r#"{"modpack":{"url":"https://x/pack.zip"}}"#).unwrap();
        assert_eq!(pack, ContentSpec::Modpack { url: "https://x/pack.zip".into() });

        let mods: ContentSpec =
            serde_json::from_str(r#"{"mods":[{"name":"Sodium","url":"https://x/s.jar","fileName":"s.jar"}]}"#)
                .unwrap();
        let ContentSpec::Mods(entries) = mods else { panic!("expected mods") };
        assert_eq!(entries[0].file_name.as_deref(), Some("s.jar"));
    }

    #[tokio::test]
    async fn mod_list_lands_in_mods_dir_once() {
        let temp = TempDir::new().unwrap();
        let layout = InstanceLayout::new(temp.path());
        let origin = TestOrigin::start(|path, _| match path {
            "/mods/sodium.jar" => Reply::ok(b"sodium".to_vec()),
            "/mods/iris" => Reply::ok(b"iris".to_vec()),
            _ => Reply::status(404),
        })
        .await;
        let spec = ContentSpec::Mods(vec![
            ModEntry::new(origin.url("/mods/sodium.jar")),
            ModEntry::new(origin.url("/mods/iris")),
        ]);
        let downloader = downloader();

        assert!(!content_installed(&layout, "pack", &spec));
        install_content(&downloader, &layout, "pack", &spec, 4, None).await.unwrap();

        let mods = layout.mods_dir("pack");
        assert_eq!(std::fs::read(mods.join("sodium.jar")).unwrap(), b"sodium");
        assert_eq!(std::fs::read(mods.join("iris.jar")).unwrap(), b"iris");
        assert!(content_installed(&layout, "pack", &spec));

        let hits = origin.hits();
        install_content(&downloader, &layout, "pack", &spec, 4, None).await.unwrap();
        assert_eq!(origin.hits(), hits);
    }

    #[tokio::test]
    async fn modpack_is_flattened_into_game_dir() {
        let temp = TempDir::new().unwrap();
        let layout = InstanceLayout::new(temp.path());
        let body = modpack_zip();
        let origin = TestOrigin::start(move |path, _| match path {
            "/packs/pack.zip" => Reply::ok(body.clone()),
            _ => Reply::status(404),
        })
        .await;
        let spec = ContentSpec::Modpack { url: origin.url("/packs/pack.zip") };

        install_content(&downloader(), &layout, "pack", &spec, 4, None).await.unwrap();

        let game_dir = layout.instance_dir("pack");
        assert_eq!(std::fs::read(game_dir.join("mods/sodium.jar")).unwrap(), b"sodium");
        assert!(game_dir.join("config/sodium.json").is_file());
        assert!(game_dir.join(MODPACK_MARKER).is_file());
        assert!(!layout.temp_dir().join("pack.zip").exists());
        assert!(content_installed(&layout, "pack", &spec));
    }

    #[tokio::test]
    async fn failed_mod_download_fails_the_stage() {
        let temp = TempDir::new().unwrap();
        let layout = InstanceLayout::new(temp.path());
        let origin = TestOrigin::start(|_, _| Reply::status(404)).await;
        let spec = ContentSpec::Mods(vec![ModEntry::new(origin.url("/gone.jar"))]);

        let result = install_content(&downloader(), &layout, "pack", &spec, 2, None).await;

        assert!(result.is_err());
        assert!(!layout.mods_dir("pack").join("gone.jar").exists());
    }
}
