use async_trait::async_trait;
use serde::Deserialize;
use tracing::{info, warn};

use super::context::InstallContext;
use super::installer::{LoaderInstallResult, LoaderInstaller};
use super::libraries;
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::instance::InstanceLayout;
use crate::core::platform::Platform;
use crate::core::version::VersionDescriptor;

/// One row of `/v2/versions/loader/<mc>`.
#[derive(Debug, Deserialize)]
struct LoaderListing {
    loader: LoaderVersion,
}

#[derive(Debug, Deserialize)]
struct LoaderVersion {
    version: String,
    #[serde(default)]
    stable: bool,
}

pub struct FabricInstaller;

impl FabricInstaller {
    pub fn version_id(minecraft_version: &str, loader_version: &str) -> String {
        format!("fabric-loader-{loader_version}-{minecraft_version}")
    }

    fn meta_url(ctx: &InstallContext<'_>, path: &str) -> String {
        format!("{}/v2{}", ctx.endpoints().fabric_meta.trim_end_matches('/'), path)
    }

    /// Newest stable loader for the game version (newest overall when none
    /// is flagged stable).
    async fn recommended_loader(&self, ctx: &InstallContext<'_>) -> LauncherResult<String> {
        let url = Self::meta_url(ctx, &format!("/versions/loader/{}", ctx.minecraft_version));
        let listings: Vec<LoaderListing> = ctx.downloader.get_json(&url).await?;
        let pick = listings
            .iter()
            .find(|l| l.loader.stable)
            .or_else(|| listings.first())
            .ok_or_else(|| {
                LauncherError::Loader(format!(
                    "Fabric has no loader for Minecraft {}",
                    ctx.minecraft_version
                ))
            })?;
        Ok(pick.loader.version.clone())
    }

    fn is_complete(layout: &InstanceLayout, platform: &Platform, id: &str) -> bool {
        let Ok(descriptor) = VersionDescriptor::load(&layout.version_json(id)) else {
            return false;
        };
        libraries::missing_library_files(&descriptor.libraries, layout, platform)
            .map_or(false, |missing| missing.is_empty())
    }
}

/// Numeric parts of a loader version, so `0.15.0` sorts above `0.9.3`.
fn version_key(version: &str) -> Vec<u64> {
    version
        .split(|ch: char| !ch.is_ascii_digit())
        .filter(|part| !part.is_empty())
        .filter_map(|part| part.parse().ok())
        .collect()
}

#[async_trait]
impl LoaderInstaller for FabricInstaller {
    fn installed_version(&self, ctx: &InstallContext<'_>) -> Option<String> {
        let layout = ctx.layout();
        if let Some(loader) = ctx.loader_version {
            let id = Self::version_id(ctx.minecraft_version, loader);
            return Self::is_complete(layout, ctx.platform(), &id).then_some(id);
        }

        let suffix = format!("-{}", ctx.minecraft_version);
        let mut candidates: Vec<String> = std::fs::read_dir(layout.versions_dir())
            .ok()?
            .filter_map(Result::ok)
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .filter(|name| name.starts_with("fabric-loader-") && name.ends_with(&suffix))
            .collect();
        candidates.sort_by_cached_key(|id| {
            let loader = id
                .strip_prefix("fabric-loader-")
                .and_then(|rest| rest.strip_suffix(&suffix))
                .unwrap_or_default();
            version_key(loader)
        });
        candidates
            .into_iter()
            .rev()
            .find(|id| Self::is_complete(layout, ctx.platform(), id))
    }

    async fn install(&self, ctx: &InstallContext<'_>) -> LauncherResult<LoaderInstallResult> {
        let loader = match ctx.loader_version {
            Some(version) => version.to_string(),
            None => self.recommended_loader(ctx).await?,
        };
        let id = Self::version_id(ctx.minecraft_version, &loader);
        info!("Installing Fabric {} for Minecraft {}", loader, ctx.minecraft_version);

        let profile_url = Self::meta_url(
            ctx,
            &format!("/versions/loader/{}/{}/profile/json", ctx.minecraft_version, loader),
        );
        let profile: VersionDescriptor = ctx
            .downloader
            .fetch_json(&profile_url, &ctx.layout().version_json(&id))
            .await?;
        if profile.id != id {
            warn!("Fabric profile calls itself {} but is stored as {}", profile.id, id);
        }
        if profile.main_class.trim().is_empty() {
            return Err(LauncherError::Loader("Fabric profile has no main class".into()));
        }
        (ctx.progress)(20);

        libraries::install_libraries(
            ctx.downloader,
            &profile.libraries,
            ctx.layout(),
            ctx.platform(),
            Some(&ctx.endpoints().fabric_maven),
            ctx.launcher.config.download_concurrency,
            Some(ctx.batch_progress(20, 100)),
        )
        .await?;

        info!("Fabric {} installed as {}", loader, id);
        Ok(LoaderInstallResult::complete(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::downloader::testing::{Reply, TestOrigin};
    use crate::core::platform::OsName;
    use crate::core::state::{Endpoints, LauncherConfig, LauncherContext};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn launcher(root: &std::path::Path, base: &str) -> LauncherContext {
        let mut config = LauncherConfig::with_data_dir(root);
        config.endpoints = Endpoints::all_at(base);
        config.retry_base_delay_ms = 10;
        LauncherContext::with_parts(config, Platform::new(OsName::Linux, "x86_64"), reqwest::Client::new())
    }

    #[test]
    fn version_id_follows_fabric_naming() {
        assert_eq!(
            FabricInstaller::version_id("1.20.1", "0.15.11"),
            "fabric-loader-0.15.11-1.20.1"
        );
    }

    #[tokio::test]
    async fn recommended_loader_is_installed_with_its_libraries() {
        let temp = TempDir::new().unwrap();
        let listing = serde_json::to_vec(&serde_json::json!([
            {"loader": {"version": "0.16.0-beta.1", "stable": false}},
            {"loader": {"version": "0.15.11", "stable": true}}
        ]))
        .unwrap();
        let profile = serde_json::to_vec(&serde_json::json!({
            "id": "fabric-loader-0.15.11-1.20.1",
            "inheritsFrom": "1.20.1",
            "mainClass": "net.fabricmc.loader.impl.launch.knot.KnotClient",
            "arguments": {"game": [], "jvm": ["-DFabricMcEmu= net.minecraft.client.main.Main "]},
            "libraries": [
                {"name": "net.fabricmc:fabric-loader:0.15.11"},
                {"name": "org.ow2.asm:asm:9.6", "url": "https://maven.fabricmc.net/"}
            ]
        }))
        .unwrap();
        let origin = TestOrigin::start(move |path, _| match path {
            "/fabric-meta/v2/versions/loader/1.20.1" => Reply::ok(listing.clone()),
            "/fabric-meta/v2/versions/loader/1.20.1/0.15.11/profile/json" => Reply::ok(profile.clone()),
            "/fabric-maven/net/fabricmc/fabric-loader/0.15.11/fabric-loader-0.15.11.jar" => {
                Reply::ok(b"loader".to_vec())
            }
            _ => Reply::status(404),
        })
        .await;
        let launcher = launcher(temp.path(), &origin.base_url());
        let downloader = launcher.downloader(Default::default());

        // The asm entry names a real remote repository; put it in place so
        // only the loader jar has to come from the test origin.
        let asm = launcher.layout.library_path("org/ow2/asm/asm/9.6/asm-9.6.jar");
        std::fs::create_dir_all(asm.parent().unwrap()).unwrap();
        std::fs::write(&asm, b"asm").unwrap();

        let ctx = InstallContext {
            launcher: &launcher,
            minecraft_version: "1.20.1",
            loader_version: None,
            downloader: &downloader,
            java: None,
            progress: Arc::new(|_| {}),
        };
        assert_eq!(FabricInstaller.installed_version(&ctx), None);

        let result = FabricInstaller.install(&ctx).await.unwrap();

        assert_eq!(result, LoaderInstallResult::complete("fabric-loader-0.15.11-1.20.1"));
        assert!(launcher
            .layout
            .library_path("net/fabricmc/fabric-loader/0.15.11/fabric-loader-0.15.11.jar")
            .is_file());
        assert_eq!(
            FabricInstaller.installed_version(&ctx).as_deref(),
            Some("fabric-loader-0.15.11-1.20.1")
        );
    }

    #[test]
    fn newest_installed_loader_wins_by_number() {
        let temp = TempDir::new().unwrap();
        let launcher = launcher(temp.path(), "http://127.0.0.1:9");
        for loader in ["0.9.3", "0.15.0", "0.14.21"] {
            let id = FabricInstaller::version_id("1.20.1", loader);
            let json = launcher.layout.version_json(&id);
            std::fs::create_dir_all(json.parent().unwrap()).unwrap();
            std::fs::write(&json, format!(r#"{{"id":"{id}","inheritsFrom":"1.20.1"}}"#)).unwrap();
        }
        let downloader = launcher.downloader(Default::default());
        let ctx = InstallContext {
            launcher: &launcher,
            minecraft_version: "1.20.1",
            loader_version: None,
            downloader: &downloader,
            java: None,
            progress: Arc::new(|_| {}),
        };

        assert_eq!(
            FabricInstaller.installed_version(&ctx).as_deref(),
            Some("fabric-loader-0.15.0-1.20.1")
        );
        assert!(version_key("0.15.0") > version_key("0.9.3"));
    }
}
