use std::path::PathBuf;
use thiserror::Error;

/// Central error type for the launcher core.
/// Every module returns `Result<T, LauncherError>`.
#[derive(Debug, Error)]
pub enum LauncherError {
    // ── IO ──────────────────────────────────────────────
    #[error("IO error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    // ── Network ─────────────────────────────────────────
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {status} for {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("Network error for {url} after {attempts} attempts: {source}")]
    Network {
        url: String,
        attempts: u32,
        #[source]
        source: Box<LauncherError>,
    },

    // ── Integrity ───────────────────────────────────────
    #[error("Corrupt artifact from {origin}: {reason}")]
    CorruptArtifact { origin: String, reason: String },

    #[error("SHA-1 mismatch for {path:?}: expected {expected}, got {actual}")]
    Sha1Mismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    // ── Resolution ──────────────────────────────────────
    #[error("Missing dependencies ({}): {}", paths.len(), format_paths(paths))]
    MissingDependency { paths: Vec<PathBuf> },

    #[error("Inheritance cycle detected at version {0}")]
    InheritanceCycle(String),

    #[error("Invalid Maven coordinate: {0}")]
    InvalidMavenCoordinate(String),

    // ── Serialization ───────────────────────────────────
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // ── Archive ─────────────────────────────────────────
    #[error("Zip extraction error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Unsupported archive {path:?}: {reason}")]
    UnsupportedArchiveFormat { path: PathBuf, reason: String },

    // ── Loader / Java ───────────────────────────────────
    #[error("Loader error: {0}")]
    Loader(String),

    #[error("Java runtime error: {0}")]
    Java(String),

    // ── Pipeline ────────────────────────────────────────
    #[error("Stage '{stage}' failed: {source}")]
    StageFailure {
        stage: String,
        #[source]
        source: Box<LauncherError>,
    },

    #[error("Operation cancelled")]
    Cancelled,

    // ── Launch ──────────────────────────────────────────
    #[error("Process launch failed: {0}")]
    ProcessLaunchFailure(String),

    // ── Generic ─────────────────────────────────────────
    #[error("{0}")]
    Other(String),
}

/// Convenience alias used throughout the crate.
pub type LauncherResult<T> = Result<T, LauncherError>;

impl LauncherError {
    /// Whether a failed download attempt may succeed when repeated.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LauncherError::Http(_)
                | LauncherError::HttpStatus { .. }
                | LauncherError::CorruptArtifact { .. }
                | LauncherError::Sha1Mismatch { .. }
                | LauncherError::Io { .. }
        )
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        LauncherError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn stage(stage: impl Into<String>, source: LauncherError) -> Self {
        LauncherError::StageFailure {
            stage: stage.into(),
            source: Box::new(source),
        }
    }
}

impl From<std::io::Error> for LauncherError {
    fn from(source: std::io::Error) -> Self {
        LauncherError::Io {
            path: PathBuf::new(),
            source,
        }
    }
}

fn format_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
