pub mod arguments;
pub mod classpath;
pub mod command;
pub mod natives;
pub mod task;

pub use arguments::{dedup_arguments, render, render_with_features, split_legacy, substitute, TemplateVariables};
pub use classpath::{assemble, ResolvedLibrarySet};
pub use command::{script_name, LaunchCommand};
pub use task::{build_command, launch, prepare, LaunchRequest, LaunchedGame};
