use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SortError {
    #[error("Invalid root folder {path}: {reason}")]
    InvalidRoot { path: PathBuf, reason: String },

    #[error("Failed to scan {path}: {source}")]
    Scan {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Probe tool unavailable at {tool}: {reason}")]
    ToolUnavailable { tool: PathBuf, reason: String },

    #[error("No video stream found in {0}")]
    NoVideoStream(PathBuf),

    #[error("Probe failed for {path}: {detail}")]
    ProcessError { path: PathBuf, detail: String },

    #[error("Probe timed out after {after:?} for {path}")]
    Timeout { path: PathBuf, after: Duration },

    #[error("Destination already exists: {destination}")]
    Collision { destination: PathBuf },

    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("A run is already in progress for {0}")]
    RunInProgress(PathBuf),

    #[error("Run cancelled")]
    Cancelled,

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Flat discriminant of [`SortError`], suitable for failure records and
/// serialized summaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    InvalidRoot,
    ScanError,
    ToolUnavailable,
    NoVideoStream,
    ProcessError,
    Timeout,
    CollisionError,
    IoError,
    RunInProgress,
    Cancelled,
    Internal,
}

impl SortError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SortError::InvalidRoot { .. } => ErrorKind::InvalidRoot,
            SortError::Scan { .. } => ErrorKind::ScanError,
            SortError::ToolUnavailable { .. } => ErrorKind::ToolUnavailable,
            SortError::NoVideoStream(_) => ErrorKind::NoVideoStream,
            SortError::ProcessError { .. } => ErrorKind::ProcessError,
            SortError::Timeout { .. } => ErrorKind::Timeout,
            SortError::Collision { .. } => ErrorKind::CollisionError,
            SortError::Io { .. } => ErrorKind::IoError,
            SortError::RunInProgress(_) => ErrorKind::RunInProgress,
            SortError::Cancelled => ErrorKind::Cancelled,
            SortError::Internal(_) => ErrorKind::Internal,
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SortError::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, SortError>;
