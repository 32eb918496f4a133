pub mod context;
pub mod fabric;
pub mod forge;
pub mod installer;
pub mod libraries;
pub mod vanilla;

pub use context::{InstallContext, StageProgress};
pub use fabric::FabricInstaller;
pub use forge::ForgeInstaller;
pub use installer::{Installer, LoaderInstallResult, LoaderInstaller, LoaderKind};
pub use libraries::{install_libraries, missing_library_files, plan_library_downloads, LibraryPlan};
pub use vanilla::VanillaInstaller;
