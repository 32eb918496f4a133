use reqwest::Client;
use tokio_util::sync::CancellationToken;

use crate::core::downloader::Downloader;
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::http::build_http_client;
use crate::core::instance::InstanceLayout;
use crate::core::platform::Platform;

use super::config::LauncherConfig;

/// Everything a component needs from its surroundings, built once and
/// passed down explicitly.
#[derive(Clone)]
pub struct LauncherContext {
    pub config: LauncherConfig,
    pub layout: InstanceLayout,
    pub platform: Platform,
    pub http: Client,
}

impl LauncherContext {
    pub fn new(config: LauncherConfig) -> LauncherResult<Self> {
        let http = build_http_client().map_err(LauncherError::Http)?;
        Ok(Self::with_parts(config, Platform::current(), http))
    }

    pub fn with_parts(config: LauncherConfig, platform: Platform, http: Client) -> Self {
        let layout = InstanceLayout::new(&config.data_dir);
        Self {
            config,
            layout,
            platform,
            http,
        }
    }

    /// A downloader using the configured retry policy and `cancel`.
    pub fn downloader(&self, cancel: CancellationToken) -> Downloader {
        Downloader::new(self.http.clone(), self.config.retry_policy()).with_cancellation(cancel)
    }
}
