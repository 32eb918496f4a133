mod probe;
mod runtime;

pub use probe::{probe_java, JavaInstallation};
pub use runtime::{
    adoptium_url, ensure_runtime, java_exe, locate_java_binary, managed_runtime,
    required_java_for_minecraft_version, RuntimeSource, SelectedRuntime,
};
