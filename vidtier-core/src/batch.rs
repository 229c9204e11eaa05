use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::discover::ScanWarning;
use crate::error::ErrorKind;
use crate::events::{FileOutcome, FileReport, RunState};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub path: PathBuf,
    pub kind: ErrorKind,
    pub message: String,
}

/// Outcome of one run over a root folder. Immutable once the run has ended.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResult {
    pub run_id: Uuid,
    pub root: PathBuf,
    /// `Completed` or `Aborted`.
    pub status: RunState,
    /// Files discovered by the scan.
    pub total: usize,
    pub moved: usize,
    pub already_sorted: usize,
    pub skipped: usize,
    pub failed: usize,
    pub failures: Vec<FailureRecord>,
    /// One report per processed file, in completion order.
    pub reports: Vec<FileReport>,
    pub scan_warnings: Vec<ScanWarning>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl BatchResult {
    /// Files with a recorded outcome.
    pub fn processed(&self) -> usize {
        self.reports.len()
    }

    pub fn is_completed(&self) -> bool {
        self.status == RunState::Completed
    }

    pub fn first_failures(&self, n: usize) -> &[FailureRecord] {
        &self.failures[..n.min(self.failures.len())]
    }

    /// Human readable summary: counts plus the first `max_failures` failures.
    pub fn summary(&self, max_failures: usize) -> String {
        let mut out = String::new();
        if self.total == 0 && self.is_completed() {
            let _ = writeln!(out, "No videos found in {}.", self.root.display());
        } else {
            let _ = writeln!(
                out,
                "Moved {} video(s) into resolution folders.",
                self.moved
            );
        }
        let _ = writeln!(
            out,
            "Scanned {} | processed {} | skipped {} | failed {} | already sorted {}",
            self.total,
            self.processed(),
            self.skipped,
            self.failed,
            self.already_sorted
        );
        if let RunState::Aborted(reason) = &self.status {
            let _ = writeln!(out, "Run aborted: {reason}");
        }
        if !self.scan_warnings.is_empty() {
            let _ = writeln!(
                out,
                "{} folder(s) could not be read during the scan",
                self.scan_warnings.len()
            );
        }
        let shown = self.first_failures(max_failures);
        if !shown.is_empty() {
            let _ = writeln!(
                out,
                "Failures (first {} of {}):",
                shown.len(),
                self.failures.len()
            );
            for failure in shown {
                let _ = writeln!(
                    out,
                    "  {}: {:?}: {}",
                    failure.path.display(),
                    failure.kind,
                    failure.message
                );
            }
        }
        out
    }
}

/// Accumulates a [`BatchResult`] while the run is in flight.
#[derive(Debug)]
pub struct BatchResultBuilder {
    run_id: Uuid,
    root: PathBuf,
    total: usize,
    moved: usize,
    already_sorted: usize,
    skipped: usize,
    failed: usize,
    failures: Vec<FailureRecord>,
    reports: Vec<FileReport>,
    scan_warnings: Vec<ScanWarning>,
    started_at: DateTime<Utc>,
}

impl BatchResultBuilder {
    pub fn new(run_id: Uuid, root: &Path) -> Self {
        Self {
            run_id,
            root: root.to_path_buf(),
            total: 0,
            moved: 0,
            already_sorted: 0,
            skipped: 0,
            failed: 0,
            failures: Vec::new(),
            reports: Vec::new(),
            scan_warnings: Vec::new(),
            started_at: Utc::now(),
        }
    }

    pub fn set_scan(&mut self, total: usize, warnings: Vec<ScanWarning>) {
        self.total = total;
        self.scan_warnings = warnings;
    }

    /// Record a finished file; returns how many files are done so far.
    pub fn record(&mut self, report: FileReport) -> usize {
        match &report.outcome {
            FileOutcome::Moved { .. } => self.moved += 1,
            FileOutcome::AlreadySorted { .. } => self.already_sorted += 1,
            FileOutcome::Skipped { .. } => self.skipped += 1,
            FileOutcome::Failed { kind, message } => {
                self.failed += 1;
                self.failures.push(FailureRecord {
                    path: report.path.clone(),
                    kind: *kind,
                    message: message.clone(),
                });
            }
        }
        self.reports.push(report);
        self.reports.len()
    }

    pub fn total(&self) -> usize {
        self.total
    }

    /// Files with a recorded outcome so far.
    pub fn processed(&self) -> usize {
        self.reports.len()
    }

    pub fn finish(self, status: RunState) -> BatchResult {
        BatchResult {
            run_id: self.run_id,
            root: self.root,
            status,
            total: self.total,
            moved: self.moved,
            already_sorted: self.already_sorted,
            skipped: self.skipped,
            failed: self.failed,
            failures: self.failures,
            reports: self.reports,
            scan_warnings: self.scan_warnings,
            started_at: self.started_at,
            finished_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::AbortReason;
    use crate::relocate::MoveMethod;
    use crate::tier::Tier;

    fn report(name: &str, outcome: FileOutcome) -> FileReport {
        FileReport {
            path: PathBuf::from(name),
            height: None,
            outcome,
        }
    }

    #[test]
    fn counts_follow_outcomes() {
        let mut builder = BatchResultBuilder::new(Uuid::now_v7(), Path::new("/videos"));
        builder.set_scan(4, Vec::new());
        builder.record(report(
            "a.mp4",
            FileOutcome::Moved {
                tier: Tier::Hd,
                destination: PathBuf::from("/videos/HD/a.mp4"),
                method: MoveMethod::Rename,
            },
        ));
        builder.record(report(
            "b.mp4",
            FileOutcome::Skipped {
                reason: "no video stream".into(),
            },
        ));
        let done = builder.record(report(
            "c.avi",
            FileOutcome::Failed {
                kind: ErrorKind::ProcessError,
                message: "exit status 1".into(),
            },
        ));
        assert_eq!(done, 3);
        assert_eq!(builder.processed(), 3);
        assert_eq!(builder.total(), 4);

        let result = builder.finish(RunState::Aborted(AbortReason::Cancelled));
        assert_eq!(
            (result.total, result.moved, result.skipped, result.failed),
            (4, 1, 1, 1)
        );
        assert_eq!(result.processed(), 3);
        assert_eq!(result.failures[0].path, PathBuf::from("c.avi"));

        let summary = result.summary(5);
        assert!(summary.contains("Moved 1 video(s) into resolution folders."));
        assert!(summary.contains("Run aborted: cancelled"));
        assert!(summary.contains("c.avi: ProcessError: exit status 1"));
    }

    #[test]
    fn summary_caps_failures() {
        let mut builder = BatchResultBuilder::new(Uuid::now_v7(), Path::new("/videos"));
        builder.set_scan(10, Vec::new());
        for i in 0..10 {
            builder.record(report(
                &format!("{i}.mkv"),
                FileOutcome::Failed {
                    kind: ErrorKind::Timeout,
                    message: "timed out".into(),
                },
            ));
        }
        let result = builder.finish(RunState::Completed);
        assert_eq!(result.first_failures(3).len(), 3);
        assert!(result.summary(3).contains("Failures (first 3 of 10):"));
    }

    #[test]
    fn empty_completed_run_reads_as_no_videos() {
        let builder = BatchResultBuilder::new(Uuid::now_v7(), Path::new("/empty"));
        let result = builder.finish(RunState::Completed);
        assert!(result.summary(5).starts_with("No videos found in /empty."));
    }
}
