use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use serde::Deserialize;
use tracing::{debug, info};

use crate::core::downloader::{BatchReport, DownloadTask, Downloader, ProgressFn};
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::instance::InstanceLayout;
use crate::core::version::AssetIndexRef;

/// Asset index document: virtual path to content-addressed object.
#[derive(Debug, Clone, Deserialize)]
pub struct AssetIndex {
    pub objects: BTreeMap<String, AssetObject>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AssetObject {
    pub hash: String,
    pub size: u64,
}

impl AssetObject {
    /// `<hash[0:2]>/<hash>`, relative to both the objects dir and the
    /// resources origin.
    pub fn relative_path(&self) -> String {
        format!("{}/{}", self.prefix(), self.hash)
    }

    fn prefix(&self) -> &str {
        self.hash.get(..2).unwrap_or(&self.hash)
    }
}

impl AssetIndex {
    pub fn load(path: &Path) -> LauncherResult<Self> {
        let raw = std::fs::read(path).map_err(|e| LauncherError::io(path, e))?;
        Ok(serde_json::from_slice(&raw)?)
    }

    /// Distinct objects; several virtual paths may share one hash.
    pub fn unique_objects(&self) -> Vec<&AssetObject> {
        let mut seen = HashSet::new();
        self.objects
            .values()
            .filter(|object| seen.insert(object.hash.as_str()))
            .collect()
    }

    /// Objects with no non-empty file at their content-addressed path.
    pub fn missing_objects(&self, layout: &InstanceLayout) -> Vec<&AssetObject> {
        self.unique_objects()
            .into_iter()
            .filter(|object| {
                let path = layout.asset_object_path(&object.hash);
                !std::fs::metadata(path).map_or(false, |meta| meta.is_file() && meta.len() > 0)
            })
            .collect()
    }
}

/// Whether the index and every object it names are on disk.
pub fn assets_installed(layout: &InstanceLayout, index_ref: &AssetIndexRef) -> bool {
    let path = layout.asset_index_path(&index_ref.id);
    match AssetIndex::load(&path) {
        Ok(index) => index.missing_objects(layout).is_empty(),
        Err(_) => false,
    }
}

/// Load the index from disk when it is already there, else fetch it.
pub async fn load_or_fetch_index(
    downloader: &Downloader,
    layout: &InstanceLayout,
    index_ref: &AssetIndexRef,
) -> LauncherResult<AssetIndex> {
    let path = layout.asset_index_path(&index_ref.id);
    let cached = match &index_ref.sha1 {
        Some(sha1) => crate::core::downloader::is_present(&path, Some(sha1)).await,
        None => path.is_file(),
    };
    if cached {
        if let Ok(index) = AssetIndex::load(&path) {
            debug!("Using cached asset index {}", index_ref.id);
            return Ok(index);
        }
    }
    info!("Fetching asset index {} from {}", index_ref.id, index_ref.url);
    downloader.fetch_json(&index_ref.url, &path).await
}

/// Fetch the asset index and every missing object through the pool.
pub async fn install_assets(
    downloader: &Downloader,
    layout: &InstanceLayout,
    index_ref: &AssetIndexRef,
    resources_base: &str,
    pool_size: usize,
    progress: Option<ProgressFn>,
) -> LauncherResult<BatchReport> {
    let index = load_or_fetch_index(downloader, layout, index_ref).await?;
    let base = resources_base.trim_end_matches('/');
    let missing = index.missing_objects(layout);

    info!(
        "Asset index {}: {} objects, {} to download",
        index_ref.id,
        index.unique_objects().len(),
        missing.len()
    );
    let tasks = missing
        .into_iter()
        .map(|object| {
            let mut task = DownloadTask::new(
                format!("{base}/{}", object.relative_path()),
                layout.asset_object_path(&object.hash),
            )
            .with_sha1(Some(object.hash.clone()));
            task.size = Some(object.size);
            task
        })
        .collect();

    downloader.fetch_all(tasks, pool_size, progress).await
}
