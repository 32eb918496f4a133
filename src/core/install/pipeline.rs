use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::core::content::{content_installed, install_content, ContentSpec};
use crate::core::downloader::{Downloader, ProgressFn};
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::instance::{InstanceLayout, VersionLocks};
use crate::core::java::{ensure_runtime, required_java_for_minecraft_version};
use crate::core::loaders::context::scale;
use crate::core::loaders::{
    InstallContext, Installer, LoaderInstallResult, LoaderKind, StageProgress, VanillaInstaller,
};
use crate::core::state::LauncherContext;
use crate::core::version::VersionDescriptor;

use super::events::{EventSink, InstallEvent, Stage, StageStatus};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoaderSpec {
    #[serde(default)]
    pub kind: LoaderKind,
    /// `None` picks the recommended build.
    #[serde(default)]
    pub version: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallRequest {
    /// Base game version, e.g. `1.20.1`.
    pub version_id: String,
    #[serde(default)]
    pub loader: LoaderSpec,
    #[serde(default)]
    pub content: Option<ContentSpec>,
}

impl InstallRequest {
    pub fn vanilla(version_id: impl Into<String>) -> Self {
        Self {
            version_id: version_id.into(),
            loader: LoaderSpec::default(),
            content: None,
        }
    }

    fn stages(&self) -> Vec<Stage> {
        let mut stages = vec![Stage::Runtime, Stage::BaseGame];
        if self.loader.kind != LoaderKind::None {
            stages.push(Stage::Modloader);
        }
        if self.content.is_some() {
            stages.push(Stage::Content);
        }
        stages
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallOutcome {
    /// Descriptor id to launch.
    pub version_id: String,
    pub java: PathBuf,
    pub degraded: Option<String>,
}

/// Persisted once every stage has completed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstalledMarker {
    pub version_id: String,
    pub base_version: String,
    pub loader: LoaderKind,
    pub installed_at: DateTime<Utc>,
}

impl InstalledMarker {
    pub fn load(layout: &InstanceLayout, instance_id: &str) -> Option<Self> {
        let raw = std::fs::read(layout.installed_marker(instance_id)).ok()?;
        serde_json::from_slice(&raw).ok()
    }
}

/// Runs install requests stage by stage. Clones share the per-version locks.
#[derive(Clone)]
pub struct InstallPipeline {
    launcher: LauncherContext,
    locks: VersionLocks,
}

impl InstallPipeline {
    pub fn new(launcher: LauncherContext) -> Self {
        Self {
            launcher,
            locks: VersionLocks::default(),
        }
    }

    pub fn launcher(&self) -> &LauncherContext {
        &self.launcher
    }

    pub async fn run(
        &self,
        request: &InstallRequest,
        events: EventSink,
        cancel: CancellationToken,
    ) -> LauncherResult<InstallOutcome> {
        let launcher = &self.launcher;
        let layout = &launcher.layout;
        let base_id = request.version_id.as_str();
        info!(
            "Install requested: {} (loader {}, content {})",
            base_id,
            request.loader.kind,
            request.content.is_some()
        );

        for stage in request.stages() {
            events.transition(stage, StageStatus::Pending);
        }

        let _guard = self
            .locks
            .lock(base_id, &layout.lock_path(base_id), &cancel)
            .await?;
        let downloader = &launcher.downloader(cancel.clone());

        // ── runtime ──
        let required_major = required_java(layout, base_id);
        let runtime = run_stage(Stage::Runtime, &events, &cancel, |progress| async move {
            ensure_runtime(launcher, downloader, required_major, &*progress).await
        })
        .await?;

        // ── base game ──
        run_stage(Stage::BaseGame, &events, &cancel, |progress| async move {
            if VanillaInstaller::is_installed(layout, &launcher.platform, base_id) {
                info!("Minecraft {} already installed", base_id);
                return Ok(());
            }
            let ctx = install_context(launcher, base_id, None, downloader, None, progress);
            VanillaInstaller::install(&ctx).await.map(|_| ())
        })
        .await?;

        // ── modloader ──
        let loader = if request.loader.kind == LoaderKind::None {
            LoaderInstallResult::complete(base_id)
        } else {
            let java = runtime.java.as_path();
            let loader_version = request.loader.version.as_deref();
            run_stage(Stage::Modloader, &events, &cancel, |progress| async move {
                let installer = Installer::new(request.loader.kind);
                let ctx =
                    install_context(launcher, base_id, loader_version, downloader, Some(java), progress);
                if let Some(id) = installer.installed_version(&ctx) {
                    info!("{} loader already installed as {}", request.loader.kind, id);
                    return Ok(LoaderInstallResult::complete(id));
                }
                installer.install(&ctx).await
            })
            .await?
        };
        if let Some(message) = &loader.degraded {
            warn!("{}", message);
            events.warning(message.clone());
        }
        let version_id = loader.version_id;

        // ── content ──
        if let Some(spec) = &request.content {
            let instance_id = version_id.as_str();
            run_stage(Stage::Content, &events, &cancel, |progress| async move {
                if content_installed(layout, instance_id, spec) {
                    info!("Content for {} already installed", instance_id);
                    return Ok(());
                }
                let batch: ProgressFn =
                    Arc::new(move |done, total| progress(scale(done, total, 0, 100)));
                install_content(
                    downloader,
                    layout,
                    instance_id,
                    spec,
                    launcher.config.mod_concurrency,
                    Some(batch),
                )
                .await
            })
            .await?;
        }

        write_installed_marker(layout, &version_id, request)?;
        info!("Install of {} complete", version_id);
        events.emit(InstallEvent::Finished {
            version_id: version_id.clone(),
        });

        Ok(InstallOutcome {
            version_id,
            java: runtime.java,
            degraded: loader.degraded,
        })
    }
}

/// Run one stage between Running and Done/Failed transitions. Failures come
/// back wrapped with the stage name; cancellation is passed through as is.
async fn run_stage<T, F, Fut>(
    stage: Stage,
    events: &EventSink,
    cancel: &CancellationToken,
    body: F,
) -> LauncherResult<T>
where
    F: FnOnce(StageProgress) -> Fut,
    Fut: Future<Output = LauncherResult<T>>,
{
    if cancel.is_cancelled() {
        events.failed(stage, LauncherError::Cancelled.to_string());
        return Err(LauncherError::Cancelled);
    }
    events.transition(stage, StageStatus::Running);
    let progress = events.stage_progress(stage);

    match body(progress.clone()).await {
        Ok(value) => {
            progress(100);
            events.transition(stage, StageStatus::Done);
            Ok(value)
        }
        Err(LauncherError::Cancelled) => {
            events.failed(stage, LauncherError::Cancelled.to_string());
            Err(LauncherError::Cancelled)
        }
        Err(e) => {
            warn!("Stage {} failed: {}", stage, e);
            events.failed(stage, e.to_string());
            Err(LauncherError::stage(stage.as_str(), e))
        }
    }
}

fn install_context<'a>(
    launcher: &'a LauncherContext,
    minecraft_version: &'a str,
    loader_version: Option<&'a str>,
    downloader: &'a Downloader,
    java: Option<&'a Path>,
    progress: StageProgress,
) -> InstallContext<'a> {
    InstallContext {
        launcher,
        minecraft_version,
        loader_version,
        downloader,
        java,
        progress,
    }
}

/// The local descriptor's declared Java major, else a guess from the id.
fn required_java(layout: &InstanceLayout, version_id: &str) -> u32 {
    VersionDescriptor::load(&layout.version_json(version_id))
        .ok()
        .and_then(|d| d.java_version.map(|j| j.major_version))
        .unwrap_or_else(|| required_java_for_minecraft_version(version_id))
}

/// Leaves an existing marker for the same id untouched so repeated installs
/// do not rewrite it.
fn write_installed_marker(
    layout: &InstanceLayout,
    version_id: &str,
    request: &InstallRequest,
) -> LauncherResult<()> {
    if InstalledMarker::load(layout, version_id).map_or(false, |m| m.version_id == version_id) {
        return Ok(());
    }
    let marker = InstalledMarker {
        version_id: version_id.to_string(),
        base_version: request.version_id.clone(),
        loader: request.loader.kind,
        installed_at: Utc::now(),
    };
    let path = layout.installed_marker(version_id);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| LauncherError::io(parent, e))?;
    }
    std::fs::write(&path, serde_json::to_vec_pretty(&marker)?).map_err(|e| LauncherError::io(&path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::content::ModEntry;
    use crate::core::downloader::testing::{Reply, TestOrigin};
    use crate::core::platform::{OsName, Platform};
    use crate::core::state::{Endpoints, LauncherConfig};
    use sha1::{Digest, Sha1};
    use std::collections::BTreeMap;
    use tempfile::TempDir;
    use tokio::sync::mpsc;

    fn sha1_hex(body: &[u8]) -> String {
        let mut hasher = Sha1::new();
        hasher.update(body);
        hex::encode(hasher.finalize())
    }

    fn launcher(root: &Path, base: &str) -> LauncherContext {
        let mut config = LauncherConfig::with_data_dir(root);
        config.endpoints = Endpoints::all_at(base);
        config.retry_base_delay_ms = 5;
        config.max_attempts = 2;
        LauncherContext::with_parts(config, Platform::new(OsName::Linux, "x86_64"), reqwest::Client::new())
    }

    /// A managed Java 17 that `ensure_runtime` accepts without probing.
    fn fake_managed_runtime(layout: &InstanceLayout) {
        let root = layout.runtime_dir(17);
        let java = root.join("bin").join("java");
        std::fs::create_dir_all(java.parent().unwrap()).unwrap();
        std::fs::write(&java, b"#!/bin/sh\n").unwrap();
        let marker = serde_json::json!({
            "major": 17,
            "version": "17.0.9",
            "vendor": "Eclipse Adoptium",
            "java_path": java,
            "installed_at": "2024-01-01T00:00:00Z"
        });
        std::fs::write(root.join("runtime.json"), serde_json::to_vec(&marker).unwrap()).unwrap();
    }

    async fn game_origin() -> TestOrigin {
        let client = b"client-jar".to_vec();
        let library = b"library-jar".to_vec();
        let object = b"icon-bytes".to_vec();
        let mod_jar = b"mod-jar".to_vec();
        let object_hash = sha1_hex(&object);
        let client_sha1 = sha1_hex(&client);

        // Descriptors carry absolute URLs, so the documents are built per
        // request once the origin's address is known.
        let base = std::sync::Arc::new(std::sync::OnceLock::<String>::new());
        let base_for_handler = base.clone();
        let origin = TestOrigin::start(move |path, _| {
            let base = base_for_handler.get().cloned().unwrap_or_default();
            match path {
                "/mc/game/version_manifest_v2.json" => Reply::ok(
                    serde_json::to_vec(&serde_json::json!({
                        "latest": {"release": "1.20.1", "snapshot": "1.20.1"},
                        "versions": [{"id": "1.20.1", "type": "release", "url": format!("{base}/v/1.20.1.json")}]
                    }))
                    .unwrap(),
                ),
                "/v/1.20.1.json" => Reply::ok(
                    serde_json::to_vec(&serde_json::json!({
                        "id": "1.20.1",
                        "type": "release",
                        "mainClass": "net.minecraft.client.main.Main",
                        "javaVersion": {"majorVersion": 17},
                        "downloads": {"client": {"url": format!("{base}/client.jar"), "sha1": client_sha1}},
                        "libraries": [{
                            "name": "com.example:lib:1.0",
                            "downloads": {"artifact": {
                                "path": "com/example/lib/1.0/lib-1.0.jar",
                                "url": format!("{base}/lib.jar")
                            }}
                        }],
                        "assetIndex": {"id": "5", "url": format!("{base}/index.json")}
                    }))
                    .unwrap(),
                ),
                "/client.jar" => Reply::ok(client.clone()),
                "/lib.jar" => Reply::ok(library.clone()),
                "/index.json" => Reply::ok(
                    serde_json::to_vec(&serde_json::json!({
                        "objects": {"icons/icon.png": {"hash": object_hash, "size": object.len()}}
                    }))
                    .unwrap(),
                ),
                "/mods/sodium.jar" => Reply::ok(mod_jar.clone()),
                p if p.starts_with("/resources/") && p.ends_with(&object_hash) => Reply::ok(object.clone()),
                _ => Reply::status(404),
            }
        })
        .await;
        let _ = base.set(origin.base_url());
        origin
    }

    fn snapshot(root: &Path) -> BTreeMap<PathBuf, Vec<u8>> {
        let mut files = BTreeMap::new();
        let mut stack = vec![root.to_path_buf()];
        while let Some(dir) = stack.pop() {
            for entry in std::fs::read_dir(&dir).unwrap().filter_map(Result::ok) {
                let path = entry.path();
                if path.is_dir() {
                    stack.push(path);
                } else {
                    let relative = path.strip_prefix(root).unwrap().to_path_buf();
                    files.insert(relative, std::fs::read(&path).unwrap());
                }
            }
        }
        files
    }

    #[tokio::test]
    async fn second_install_is_offline_and_byte_identical() {
        let temp = TempDir::new().unwrap();
        let origin = game_origin().await;
        let pipeline = InstallPipeline::new(launcher(temp.path(), &origin.base_url()));
        let layout = pipeline.launcher().layout.clone();
        fake_managed_runtime(&layout);

        let mut request = InstallRequest::vanilla("1.20.1");
        request.content = Some(ContentSpec::Mods(vec![ModEntry::new(origin.url("/mods/sodium.jar"))]));

        let (tx, mut rx) = mpsc::unbounded_channel();
        let outcome = pipeline
            .run(&request, EventSink::new(tx), CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.version_id, "1.20.1");
        assert_eq!(outcome.degraded, None);
        assert_eq!(std::fs::read(layout.version_jar("1.20.1")).unwrap(), b"client-jar");
        assert!(layout.library_path("com/example/lib/1.0/lib-1.0.jar").is_file());
        assert!(layout.mods_dir("1.20.1").join("sodium.jar").is_file());
        let marker = InstalledMarker::load(&layout, "1.20.1").unwrap();
        assert_eq!(marker.base_version, "1.20.1");

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        assert!(events.contains(&InstallEvent::StageTransition {
            stage: Stage::Content,
            status: StageStatus::Done,
            error: None,
        }));
        assert_eq!(
            events.last(),
            Some(&InstallEvent::Finished { version_id: "1.20.1".into() })
        );

        let hits = origin.hits();
        let before = snapshot(temp.path());
        let again = pipeline
            .run(&request, EventSink::silent(), CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(again, outcome);
        assert_eq!(origin.hits(), hits);
        assert_eq!(snapshot(temp.path()), before);
    }

    #[tokio::test]
    async fn failed_stage_is_named_and_leaves_no_marker() {
        let temp = TempDir::new().unwrap();
        let origin = TestOrigin::start(|_, _| Reply::status(404)).await;
        let pipeline = InstallPipeline::new(launcher(temp.path(), &origin.base_url()));
        fake_managed_runtime(&pipeline.launcher().layout);

        let (tx, mut rx) = mpsc::unbounded_channel();
        let err = pipeline
            .run(&InstallRequest::vanilla("1.20.1"), EventSink::new(tx), CancellationToken::new())
            .await
            .unwrap_err();

        match err {
            LauncherError::StageFailure { stage, .. } => assert_eq!(stage, "base-game"),
            other => panic!("unexpected error: {other}"),
        }
        assert!(InstalledMarker::load(&pipeline.launcher().layout, "1.20.1").is_none());

        let mut failed = None;
        while let Ok(event) = rx.try_recv() {
            if let InstallEvent::StageTransition { stage, status: StageStatus::Failed, error } = event {
                failed = Some((stage, error));
            }
        }
        let (stage, error) = failed.unwrap();
        assert_eq!(stage, Stage::BaseGame);
        assert!(error.unwrap().contains("404"));
    }

    #[tokio::test]
    async fn cancelled_install_stops_before_any_stage() {
        let temp = TempDir::new().unwrap();
        let origin = TestOrigin::start(|_, _| Reply::status(404)).await;
        let pipeline = InstallPipeline::new(launcher(temp.path(), &origin.base_url()));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = pipeline
            .run(&InstallRequest::vanilla("1.20.1"), EventSink::silent(), cancel)
            .await
            .unwrap_err();

        assert!(matches!(err, LauncherError::Cancelled));
        assert_eq!(origin.hits(), 0);
    }

    #[test]
    fn stages_follow_the_request() {
        let mut request = InstallRequest::vanilla("1.20.1");
        assert_eq!(request.stages(), [Stage::Runtime, Stage::BaseGame]);
        request.loader.kind = LoaderKind::Fabric;
        request.content = Some(ContentSpec::Mods(vec![]));
        assert_eq!(
            request.stages(),
            [Stage::Runtime, Stage::BaseGame, Stage::Modloader, Stage::Content]
        );
    }
}
