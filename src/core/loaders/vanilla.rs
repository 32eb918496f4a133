use tracing::{debug, info};

use crate::core::assets;
use crate::core::downloader::{is_present, DownloadTask};
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::instance::InstanceLayout;
use crate::core::platform::Platform;
use crate::core::version::{VersionDescriptor, VersionManifest};

use super::context::InstallContext;
use super::libraries;

/// Installs the base game: descriptor, client jar, libraries and assets.
pub struct VanillaInstaller;

impl VanillaInstaller {
    /// Whether everything the base game needs is already on disk.
    /// Only local files are consulted.
    pub fn is_installed(layout: &InstanceLayout, platform: &Platform, version_id: &str) -> bool {
        let Ok(descriptor) = VersionDescriptor::load(&layout.version_json(version_id)) else {
            return false;
        };
        let jar = layout.version_jar(version_id);
        if !std::fs::metadata(&jar).map_or(false, |m| m.is_file() && m.len() > 0) {
            return false;
        }
        match libraries::missing_library_files(&descriptor.libraries, layout, platform) {
            Ok(missing) if missing.is_empty() => {}
            Ok(missing) => {
                debug!("{} library file(s) missing for {}", missing.len(), version_id);
                return false;
            }
            Err(_) => return false,
        }
        descriptor
            .asset_index
            .as_ref()
            .map_or(true, |index| assets::assets_installed(layout, index))
    }

    pub async fn install(ctx: &InstallContext<'_>) -> LauncherResult<String> {
        let version_id = ctx.minecraft_version;
        let layout = ctx.layout();
        let downloader = ctx.downloader;
        let pool_size = ctx.launcher.config.download_concurrency;
        info!("Installing Minecraft {}", version_id);

        // 1. Descriptor
        let manifest =
            VersionManifest::fetch_from(downloader, &ctx.endpoints().version_manifest).await?;
        let entry = manifest.require(version_id)?;
        let json_path = layout.version_json(version_id);
        let cached = is_present(&json_path, entry.sha1.as_deref()).await;
        let descriptor: VersionDescriptor = match cached {
            true => VersionDescriptor::load(&json_path)?,
            false => downloader.fetch_json(&entry.url, &json_path).await?,
        };
        (ctx.progress)(5);

        // 2. Client jar
        let client = descriptor.client_artifact().ok_or_else(|| {
            LauncherError::Other(format!("descriptor {version_id} has no client download"))
        })?;
        let mut task = DownloadTask::new(client.url.clone(), layout.version_jar(version_id))
            .with_sha1(client.sha1.clone());
        task.size = client.size;
        downloader.fetch_task(&task).await?;
        (ctx.progress)(15);

        // 3. Libraries
        let report = libraries::install_libraries(
            downloader,
            &descriptor.libraries,
            layout,
            ctx.platform(),
            None,
            pool_size,
            Some(ctx.batch_progress(15, 45)),
        )
        .await?;
        debug!("Libraries for {}: {} fetched", version_id, report.downloaded);

        // 4. Assets
        if let Some(index) = &descriptor.asset_index {
            assets::install_assets(
                downloader,
                layout,
                index,
                &ctx.endpoints().resources,
                pool_size,
                Some(ctx.batch_progress(45, 100)),
            )
            .await?;
        }

        info!("Minecraft {} installed", version_id);
        Ok(version_id.to_string())
    }
}
