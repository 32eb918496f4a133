use std::collections::HashMap;
use std::io::Write;
use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info, warn};
use zip::write::SimpleFileOptions;

use super::context::InstallContext;
use super::installer::{LoaderInstallResult, LoaderInstaller};
use super::libraries;
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::instance::InstanceLayout;
use crate::core::version::VersionDescriptor;

/// Installs Forge by running the official installer headlessly. When the
/// installer cannot be obtained or fails, a minimal descriptor and a
/// placeholder client jar are written instead so the install can finish.
pub struct ForgeInstaller;

/// `promotions_slim.json`
#[derive(Debug, Deserialize)]
struct Promotions {
    #[serde(default)]
    promos: HashMap<String, String>,
}

const PLACEHOLDER_MANIFEST: &[u8] = b"Manifest-Version: 1.0\r\nCreated-By: blocklaunch\r\n\r\n";

impl ForgeInstaller {
    /// Descriptor ids the official installer has been known to produce.
    fn candidate_ids(minecraft_version: &str, forge_version: &str) -> [String; 3] {
        [
            format!("{minecraft_version}-forge-{forge_version}"),
            format!("{minecraft_version}-{forge_version}"),
            format!("forge-{minecraft_version}-{forge_version}"),
        ]
    }

    fn discover_installed(layout: &InstanceLayout, mc: &str, forge: &str) -> Option<String> {
        Self::candidate_ids(mc, forge)
            .into_iter()
            .find(|id| layout.version_json(id).is_file())
    }

    async fn recommended_version(&self, ctx: &InstallContext<'_>) -> LauncherResult<String> {
        let promotions: Promotions = ctx
            .downloader
            .get_json(&ctx.endpoints().forge_promotions)
            .await?;
        let mc = ctx.minecraft_version;
        promotions
            .promos
            .get(&format!("{mc}-recommended"))
            .or_else(|| promotions.promos.get(&format!("{mc}-latest")))
            .cloned()
            .ok_or_else(|| LauncherError::Loader(format!("Forge has no build for Minecraft {mc}")))
    }

    fn forge_coordinate(mc: &str, forge: &str) -> String {
        format!("net.minecraftforge:forge:{mc}-{forge}")
    }

    // ── Official installer ──

    async fn run_official_installer(
        &self,
        ctx: &InstallContext<'_>,
        forge_version: &str,
    ) -> LauncherResult<String> {
        let mc = ctx.minecraft_version;
        let java = ctx
            .java
            .ok_or_else(|| LauncherError::Java("no Java runtime to run the Forge installer".into()))?;
        let layout = ctx.layout();

        let full = format!("{mc}-{forge_version}");
        let installer_url = format!(
            "{}/net/minecraftforge/forge/{full}/forge-{full}-installer.jar",
            ctx.endpoints().forge_maven.trim_end_matches('/')
        );
        let installer_path = layout.temp_dir().join(format!("forge-{full}-installer.jar"));
        ctx.downloader.fetch(&installer_url, &installer_path).await?;
        (ctx.progress)(30);

        write_launcher_profiles_stub(layout.root()).await?;

        info!("Running Forge installer for {}", full);
        let output = tokio::process::Command::new(java)
            .arg("-jar")
            .arg(&installer_path)
            .arg("--installClient")
            .arg(layout.root())
            .current_dir(layout.root())
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| LauncherError::Java(format!("could not start {java:?}: {e}")));
        let _ = tokio::fs::remove_file(&installer_path).await;
        let output = output?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let tail: Vec<&str> = stderr.lines().rev().take(10).collect();
            return Err(LauncherError::Loader(format!(
                "Forge installer exited with {:?}: {}",
                output.status.code(),
                tail.into_iter().rev().collect::<Vec<_>>().join("\n")
            )));
        }

        Self::discover_installed(layout, mc, forge_version).ok_or_else(|| {
            LauncherError::Loader(format!(
                "Forge installer finished but no descriptor for {full} was found"
            ))
        })
    }

    // ── Manual fallback ──

    fn fallback_descriptor(
        ctx: &InstallContext<'_>,
        id: &str,
        forge_version: &str,
    ) -> LauncherResult<VersionDescriptor> {
        let mc = ctx.minecraft_version;
        let value = serde_json::json!({
            "id": id,
            "inheritsFrom": mc,
            "type": "release",
            "mainClass": "net.minecraft.client.main.Main",
            "arguments": {
                "game": [],
                "jvm": [
                    "-Djava.library.path=${natives_directory}",
                    "-Dminecraft.launcher.brand=${launcher_name}",
                    "-Dminecraft.launcher.version=${launcher_version}",
                    "-cp",
                    "${classpath}"
                ]
            },
            "libraries": [{
                "name": Self::forge_coordinate(mc, forge_version),
                "url": ctx.endpoints().forge_maven,
            }]
        });
        Ok(serde_json::from_value(value)?)
    }

    async fn install_fallback(
        &self,
        ctx: &InstallContext<'_>,
        forge_version: &str,
        cause: &LauncherError,
    ) -> LauncherResult<LoaderInstallResult> {
        let id = format!("{}-forge-{}", ctx.minecraft_version, forge_version);
        warn!("Forge installer unavailable ({}); assembling {} manually", cause, id);

        let mut descriptor = Self::fallback_descriptor(ctx, &id, forge_version)?;
        (ctx.progress)(30);

        let report = libraries::install_libraries(
            ctx.downloader,
            &descriptor.libraries,
            ctx.layout(),
            ctx.platform(),
            Some(&ctx.endpoints().forge_maven),
            ctx.launcher.config.download_concurrency,
            None,
        )
        .await;
        match report {
            Ok(report) if report.failures.is_empty() => {}
            Ok(report) => warn!("{} Forge library download(s) failed", report.failures.len()),
            Err(LauncherError::Cancelled) => return Err(LauncherError::Cancelled),
            Err(e) => warn!("Forge library download failed: {}", e),
        }

        // Classpath assembly requires every listed jar to exist.
        let mut kept = Vec::with_capacity(descriptor.libraries.len());
        for library in std::mem::take(&mut descriptor.libraries) {
            let missing = libraries::missing_library_files(
                std::slice::from_ref(&library),
                ctx.layout(),
                ctx.platform(),
            )?;
            if missing.is_empty() {
                kept.push(library);
            } else {
                warn!("Leaving {} out of {}: not downloaded", library.name, id);
            }
        }
        descriptor.libraries = kept;
        descriptor.save(&ctx.layout().version_json(&id))?;
        (ctx.progress)(60);

        let jar = ctx.layout().version_jar(&id);
        tokio::task::spawn_blocking(move || write_placeholder_jar(&jar))
            .await
            .map_err(|e| LauncherError::Other(format!("placeholder task failed: {e}")))??;
        (ctx.progress)(100);

        Ok(LoaderInstallResult {
            version_id: id.clone(),
            degraded: Some(format!(
                "Forge {forge_version} was installed without its official installer; {id} uses a placeholder jar and may not load mods"
            )),
        })
    }
}

#[async_trait]
impl LoaderInstaller for ForgeInstaller {
    fn installed_version(&self, ctx: &InstallContext<'_>) -> Option<String> {
        let layout = ctx.layout();
        let mc = ctx.minecraft_version;
        if let Some(forge) = ctx.loader_version {
            return Self::discover_installed(layout, mc, forge);
        }

        // Any Forge descriptor that inherits from this game version.
        let mut found: Vec<String> = std::fs::read_dir(layout.versions_dir())
            .ok()?
            .filter_map(Result::ok)
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .filter(|name| name.contains("forge"))
            .filter(|name| {
                VersionDescriptor::load(&layout.version_json(name))
                    .map_or(false, |d| d.inherits_from.as_deref() == Some(mc))
            })
            .collect();
        found.sort();
        found.pop()
    }

    async fn install(&self, ctx: &InstallContext<'_>) -> LauncherResult<LoaderInstallResult> {
        let forge_version = match ctx.loader_version {
            Some(version) => version.to_string(),
            None => self.recommended_version(ctx).await?,
        };
        info!("Installing Forge {} for Minecraft {}", forge_version, ctx.minecraft_version);
        (ctx.progress)(5);

        match self.run_official_installer(ctx, &forge_version).await {
            Ok(id) => {
                debug!("Forge installer produced {}", id);
                (ctx.progress)(100);
                Ok(LoaderInstallResult::complete(id))
            }
            Err(LauncherError::Cancelled) => Err(LauncherError::Cancelled),
            Err(cause) => self.install_fallback(ctx, &forge_version, &cause).await,
        }
    }
}

/// The installer refuses to run without a launcher profile file.
async fn write_launcher_profiles_stub(root: &Path) -> LauncherResult<()> {
    let path = root.join("launcher_profiles.json");
    if path.exists() {
        return Ok(());
    }
    tokio::fs::create_dir_all(root)
        .await
        .map_err(|e| LauncherError::io(root, e))?;
    tokio::fs::write(&path, br#"{"profiles":{},"selectedProfile":null}"#)
        .await
        .map_err(|e| LauncherError::io(&path, e))
}

/// A valid zip holding only a manifest.
fn write_placeholder_jar(path: &Path) -> LauncherResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| LauncherError::io(parent, e))?;
    }
    let file = std::fs::File::create(path).map_err(|e| LauncherError::io(path, e))?;
    let mut writer = zip::ZipWriter::new(file);
    writer.start_file("META-INF/MANIFEST.MF", SimpleFileOptions::default())?;
    writer
        .write_all(PLACEHOLDER_MANIFEST)
        .map_err(|e| LauncherError::io(path, e))?;
    writer.finish()?;
    Ok(())
}
