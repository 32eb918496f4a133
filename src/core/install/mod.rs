// ─── Install Pipeline ───
// runtime → base-game → modloader → content, strictly in order. Every stage
// checks the disk first and only fetches what is missing.

mod events;
mod pipeline;

pub use events::{EventSink, InstallEvent, Stage, StageStatus};
pub use pipeline::{InstallOutcome, InstallPipeline, InstallRequest, InstalledMarker, LoaderSpec};
