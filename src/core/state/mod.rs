mod config;
mod context;

pub use config::{default_data_dir, Endpoints, LauncherConfig, SETTINGS_FILE};
pub use context::LauncherContext;
