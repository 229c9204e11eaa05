use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::ErrorKind;
use crate::relocate::MoveMethod;
use crate::tier::Tier;

/// Why a run stopped before processing every file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AbortReason {
    Cancelled,
    ToolUnavailable(String),
    ScanFailed(String),
    Internal(String),
}

impl std::fmt::Display for AbortReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AbortReason::Cancelled => f.write_str("cancelled"),
            AbortReason::ToolUnavailable(reason) => write!(f, "probe tool unavailable: {reason}"),
            AbortReason::ScanFailed(reason) => write!(f, "scan failed: {reason}"),
            AbortReason::Internal(reason) => write!(f, "internal error: {reason}"),
        }
    }
}

/// Lifecycle of one batch run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunState {
    Idle,
    Scanning,
    Processing,
    Completed,
    Aborted(AbortReason),
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Completed | RunState::Aborted(_))
    }

    pub fn describe(&self) -> String {
        match self {
            RunState::Idle => "Idle".to_string(),
            RunState::Scanning => "Scanning…".to_string(),
            RunState::Processing => "Processing…".to_string(),
            RunState::Completed => "Done".to_string(),
            RunState::Aborted(reason) => format!("Aborted ({reason})"),
        }
    }
}

/// What happened to one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileOutcome {
    Moved {
        tier: Tier,
        destination: PathBuf,
        method: MoveMethod,
    },
    /// Already inside the folder of its tier; nothing to do.
    AlreadySorted { tier: Tier },
    /// No height could be determined; the file stays where it is.
    Skipped { reason: String },
    Failed { kind: ErrorKind, message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileReport {
    pub path: PathBuf,
    pub height: Option<u32>,
    pub outcome: FileOutcome,
}

/// Events delivered, in order, to whoever drives the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProgressEvent {
    /// Discovery finished; `total` files will be processed. Sent before any
    /// `FileCompleted`.
    Scanned { total: usize, warnings: usize },
    /// `completed` files are done so far, counted in completion order.
    FileCompleted {
        completed: usize,
        total: usize,
        report: FileReport,
    },
    NoFilesFound,
}

impl ProgressEvent {
    pub fn describe(&self) -> String {
        match self {
            ProgressEvent::Scanned { total, .. } => format!("Found {total} video(s)"),
            ProgressEvent::FileCompleted {
                completed, total, ..
            } => {
                let pct = if *total == 0 {
                    100
                } else {
                    completed * 100 / total
                };
                format!("Processing {completed}/{total} ({pct}%)…")
            }
            ProgressEvent::NoFilesFound => "No videos found".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_text_matches_display_format() {
        let event = ProgressEvent::FileCompleted {
            completed: 1,
            total: 3,
            report: FileReport {
                path: PathBuf::from("a.mp4"),
                height: None,
                outcome: FileOutcome::Skipped {
                    reason: "no video stream".into(),
                },
            },
        };
        assert_eq!(event.describe(), "Processing 1/3 (33%)…");
        assert_eq!(ProgressEvent::NoFilesFound.describe(), "No videos found");
        assert_eq!(RunState::Scanning.describe(), "Scanning…");
        assert_eq!(
            RunState::Aborted(AbortReason::Cancelled).describe(),
            "Aborted (cancelled)"
        );
    }
}
