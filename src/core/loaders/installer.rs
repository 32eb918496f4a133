use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::error::{LauncherError, LauncherResult};

use super::{context::InstallContext, fabric::FabricInstaller, forge::ForgeInstaller};

/// What a loader install produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoaderInstallResult {
    /// Descriptor id that resolution and launch use from now on.
    pub version_id: String,
    /// Set when the install completed in a reduced form.
    pub degraded: Option<String>,
}

impl LoaderInstallResult {
    pub fn complete(version_id: impl Into<String>) -> Self {
        Self {
            version_id: version_id.into(),
            degraded: None,
        }
    }
}

#[async_trait]
pub trait LoaderInstaller: Send + Sync {
    /// The descriptor id when this loader is already installed, judged from
    /// local files only.
    fn installed_version(&self, ctx: &InstallContext<'_>) -> Option<String>;

    async fn install(&self, ctx: &InstallContext<'_>) -> LauncherResult<LoaderInstallResult>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoaderKind {
    #[default]
    None,
    Fabric,
    Forge,
}

impl LoaderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoaderKind::None => "none",
            LoaderKind::Fabric => "fabric",
            LoaderKind::Forge => "forge",
        }
    }
}

impl fmt::Display for LoaderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LoaderKind {
    type Err = LauncherError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "none" | "vanilla" => Ok(LoaderKind::None),
            "fabric" => Ok(LoaderKind::Fabric),
            "forge" => Ok(LoaderKind::Forge),
            other => Err(LauncherError::Loader(format!("unsupported loader '{other}'"))),
        }
    }
}

/// Dispatch over the supported loaders without boxing.
pub enum Installer {
    None,
    Fabric(FabricInstaller),
    Forge(ForgeInstaller),
}

impl Installer {
    pub fn new(kind: LoaderKind) -> Self {
        match kind {
            LoaderKind::None => Self::None,
            LoaderKind::Fabric => Self::Fabric(FabricInstaller),
            LoaderKind::Forge => Self::Forge(ForgeInstaller),
        }
    }

    pub fn installed_version(&self, ctx: &InstallContext<'_>) -> Option<String> {
        match self {
            Installer::None => Some(ctx.minecraft_version.to_string()),
            Installer::Fabric(i) => i.installed_version(ctx),
            Installer::Forge(i) => i.installed_version(ctx),
        }
    }

    pub async fn install(&self, ctx: &InstallContext<'_>) -> LauncherResult<LoaderInstallResult> {
        match self {
            Installer::None => Ok(LoaderInstallResult::complete(ctx.minecraft_version)),
            Installer::Fabric(i) => i.install(ctx).await,
            Installer::Forge(i) => i.install(ctx).await,
        }
    }
}
