// ─── Version Manifest ───
// Mojang's version manifest v2: the list of every published game version
// and where its descriptor lives.

use serde::Deserialize;
use tracing::info;

use crate::core::downloader::Downloader;
use crate::core::error::{LauncherError, LauncherResult};

pub const VERSION_MANIFEST_URL: &str =
    "https://piston-meta.mojang.com/mc/game/version_manifest_v2.json";

#[derive(Debug, Deserialize)]
pub struct VersionManifest {
    #[serde(default)]
    pub latest: Option<LatestVersions>,
    pub versions: Vec<VersionEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LatestVersions {
    pub release: String,
    pub snapshot: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionEntry {
    pub id: String,
    #[serde(rename = "type")]
    pub version_type: String,
    #[serde(default)]
    pub release_time: String,
    pub url: String,
    #[serde(default)]
    pub sha1: Option<String>,
}

impl VersionManifest {
    /// Fetch the manifest through the retrying downloader.
    pub async fn fetch(downloader: &Downloader) -> LauncherResult<Self> {
        Self::fetch_from(downloader, VERSION_MANIFEST_URL).await
    }

    pub async fn fetch_from(downloader: &Downloader, url: &str) -> LauncherResult<Self> {
        info!("Fetching version manifest from {}", url);
        let manifest: VersionManifest = downloader.get_json(url).await?;
        info!("Loaded {} versions from manifest", manifest.versions.len());
        Ok(manifest)
    }

    pub fn find_version(&self, id: &str) -> Option<&VersionEntry> {
        self.versions.iter().find(|v| v.id == id)
    }

    /// Like [`find_version`](Self::find_version), failing when the id is unknown.
    pub fn require(&self, id: &str) -> LauncherResult<&VersionEntry> {
        self.find_version(id)
            .ok_or_else(|| LauncherError::Other(format!("unknown game version '{id}'")))
    }

    pub fn releases(&self) -> Vec<&VersionEntry> {
        self.versions
            .iter()
            .filter(|v| v.version_type == "release")
            .collect()
    }
}
