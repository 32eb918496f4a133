use std::path::Path;
use std::sync::Arc;

use crate::core::downloader::{Downloader, ProgressFn};
use crate::core::instance::InstanceLayout;
use crate::core::platform::Platform;
use crate::core::state::{Endpoints, LauncherContext};

/// Everything one install step needs, borrowed from the pipeline.
pub struct InstallContext<'a> {
    pub launcher: &'a LauncherContext,
    pub minecraft_version: &'a str,
    /// `None` selects the recommended loader version.
    pub loader_version: Option<&'a str>,
    pub downloader: &'a Downloader,
    /// Java used to run external installers.
    pub java: Option<&'a Path>,
    pub progress: StageProgress,
}

/// Receives percent complete for the running stage.
pub type StageProgress = Arc<dyn Fn(u8) + Send + Sync>;

impl<'a> InstallContext<'a> {
    pub fn layout(&self) -> &'a InstanceLayout {
        &self.launcher.layout
    }

    pub fn platform(&self) -> &'a Platform {
        &self.launcher.platform
    }

    pub fn endpoints(&self) -> &'a Endpoints {
        &self.launcher.config.endpoints
    }

    /// Bulk-download progress mapped onto `start..=end` percent.
    pub fn batch_progress(&self, start: u8, end: u8) -> ProgressFn {
        let report = self.progress.clone();
        Arc::new(move |done, total| {
            report(scale(done, total, start, end));
        })
    }
}

pub(crate) fn scale(done: usize, total: usize, start: u8, end: u8) -> u8 {
    if total == 0 {
        return end;
    }
    let span = (end.saturating_sub(start)) as usize;
    (start as usize + span * done.min(total) / total) as u8
}
