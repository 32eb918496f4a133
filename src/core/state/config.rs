use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::core::downloader::RetryPolicy;
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::maven::{FABRIC_MAVEN, FORGE_MAVEN};
use crate::core::version::VERSION_MANIFEST_URL;

const APP_DIR_NAME: &str = "blocklaunch";
pub const SETTINGS_FILE: &str = "launcher_settings.json";

/// Launcher-wide settings, persisted as `launcher_settings.json` in the
/// data directory. Unknown or missing fields fall back to defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LauncherConfig {
    pub data_dir: PathBuf,
    pub max_attempts: u32,
    pub retry_base_delay_ms: u64,
    /// Pool size for library and asset downloads.
    pub download_concurrency: usize,
    /// Pool size for mod downloads.
    pub mod_concurrency: usize,
    pub early_crash_window_ms: u64,
    pub java_path: Option<PathBuf>,
    pub memory_mb: u32,
    pub launcher_name: String,
    pub launcher_version: String,
    pub endpoints: Endpoints,
}

/// Remote origins. Overridable so a mirror (or a test origin) can stand in
/// for the public services.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Endpoints {
    pub version_manifest: String,
    pub resources: String,
    pub fabric_meta: String,
    pub fabric_maven: String,
    pub forge_maven: String,
    pub forge_promotions: String,
    pub adoptium: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            version_manifest: VERSION_MANIFEST_URL.to_string(),
            resources: "https://resources.download.minecraft.net".to_string(),
            fabric_meta: "https://meta.fabricmc.net".to_string(),
            fabric_maven: FABRIC_MAVEN.to_string(),
            forge_maven: FORGE_MAVEN.to_string(),
            forge_promotions: "https://files.minecraftforge.net/net/minecraftforge/forge/promotions_slim.json"
                .to_string(),
            adoptium: "https://api.adoptium.net".to_string(),
        }
    }
}

impl Endpoints {
    /// Every origin rooted at `base`, keeping each service's path.
    pub fn all_at(base: &str) -> Self {
        let base = base.trim_end_matches('/');
        Self {
            version_manifest: format!("{base}/mc/game/version_manifest_v2.json"),
            resources: format!("{base}/resources"),
            fabric_meta: format!("{base}/fabric-meta"),
            fabric_maven: format!("{base}/fabric-maven"),
            forge_maven: format!("{base}/forge-maven"),
            forge_promotions: format!("{base}/forge/promotions_slim.json"),
            adoptium: format!("{base}/adoptium"),
        }
    }
}

impl Default for LauncherConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            max_attempts: 3,
            retry_base_delay_ms: 1000,
            download_concurrency: 100,
            mod_concurrency: 20,
            early_crash_window_ms: 3000,
            java_path: None,
            memory_mb: 4096,
            launcher_name: APP_DIR_NAME.to_string(),
            launcher_version: env!("CARGO_PKG_VERSION").to_string(),
            endpoints: Endpoints::default(),
        }
    }
}

impl LauncherConfig {
    /// Defaults rooted at `data_dir`.
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }

    /// Load the settings file from `data_dir`, or defaults rooted there when
    /// the file is absent. A malformed file is reported, not replaced.
    pub fn load_or_default(data_dir: &Path) -> LauncherResult<Self> {
        let path = data_dir.join(SETTINGS_FILE);
        let raw = match std::fs::read(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No settings at {:?}, using defaults", path);
                return Ok(Self::with_data_dir(data_dir));
            }
            Err(e) => return Err(LauncherError::io(&path, e)),
        };

        let mut config: LauncherConfig = serde_json::from_slice(&raw)?;
        if config.data_dir != data_dir {
            warn!(
                "Settings file names data dir {:?}; using {:?} where it was found",
                config.data_dir, data_dir
            );
            config.data_dir = data_dir.to_path_buf();
        }
        Ok(config)
    }

    pub fn save(&self) -> LauncherResult<()> {
        std::fs::create_dir_all(&self.data_dir).map_err(|e| LauncherError::io(&self.data_dir, e))?;
        let path = self.data_dir.join(SETTINGS_FILE);
        let json = serde_json::to_vec_pretty(self)?;
        std::fs::write(&path, json).map_err(|e| LauncherError::io(&path, e))
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            base_delay: Duration::from_millis(self.retry_base_delay_ms),
        }
    }

    pub fn early_crash_window(&self) -> Duration {
        Duration::from_millis(self.early_crash_window_ms)
    }
}

pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR_NAME)
}
