use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;

use crate::core::loaders::StageProgress;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    Runtime,
    BaseGame,
    Modloader,
    Content,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Runtime => "runtime",
            Stage::BaseGame => "base-game",
            Stage::Modloader => "modloader",
            Stage::Content => "content",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StageStatus {
    Pending,
    Running,
    Done,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum InstallEvent {
    Progress {
        stage: Stage,
        percent: u8,
    },
    StageTransition {
        stage: Stage,
        status: StageStatus,
        error: Option<String>,
    },
    Warning {
        message: String,
    },
    Finished {
        version_id: String,
    },
}

/// Sending half handed to the pipeline. A dropped receiver is not an error:
/// the install keeps going without an audience.
#[derive(Clone, Default)]
pub struct EventSink {
    tx: Option<UnboundedSender<InstallEvent>>,
}

impl EventSink {
    pub fn new(tx: UnboundedSender<InstallEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    /// A sink that discards everything.
    pub fn silent() -> Self {
        Self::default()
    }

    pub fn emit(&self, event: InstallEvent) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(event);
        }
    }

    pub fn transition(&self, stage: Stage, status: StageStatus) {
        self.emit(InstallEvent::StageTransition {
            stage,
            status,
            error: None,
        });
    }

    pub fn failed(&self, stage: Stage, error: impl Into<String>) {
        self.emit(InstallEvent::StageTransition {
            stage,
            status: StageStatus::Failed,
            error: Some(error.into()),
        });
    }

    pub fn warning(&self, message: impl Into<String>) {
        self.emit(InstallEvent::Warning {
            message: message.into(),
        });
    }

    /// Percent reporter for `stage` that never goes backwards and never
    /// repeats a value.
    pub fn stage_progress(&self, stage: Stage) -> StageProgress {
        let sink = self.clone();
        let last = Arc::new(AtomicU8::new(0));
        Arc::new(move |percent: u8| {
            let percent = percent.min(100);
            let previous = last.fetch_max(percent, Ordering::SeqCst);
            if percent > previous {
                sink.emit(InstallEvent::Progress { stage, percent });
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[test]
    fn stage_progress_is_monotonic() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sink = EventSink::new(tx);
        let progress = sink.stage_progress(Stage::BaseGame);
        for percent in [5, 3, 40, 40, 120] {
            progress(percent);
        }

        let mut seen = Vec::new();
        while let Ok(InstallEvent::Progress { percent, .. }) = rx.try_recv() {
            seen.push(percent);
        }
        assert_eq!(seen, [5, 40, 100]);
    }

    #[test]
    fn events_serialize_with_stage_names() {
        let event = InstallEvent::StageTransition {
            stage: Stage::BaseGame,
            status: StageStatus::Running,
            error: None,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "stageTransition");
        assert_eq!(json["stage"], "base-game");
        assert_eq!(json["status"], "running");
    }

    #[test]
    fn silent_sink_swallows_events() {
        EventSink::silent().warning("nobody listens");
    }
}
