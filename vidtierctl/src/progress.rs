use std::time::Duration;

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use vidtier_core::{FileOutcome, ProgressEvent, RunState};

/// Renders run progress on stderr. Draws nothing when stderr is not a
/// terminal or when disabled.
#[derive(Debug)]
pub struct ProgressReporter {
    bar: ProgressBar,
}

impl ProgressReporter {
    pub fn new(enabled: bool) -> Self {
        let target = if enabled {
            ProgressDrawTarget::stderr()
        } else {
            ProgressDrawTarget::hidden()
        };
        let bar = ProgressBar::with_draw_target(None, target);
        bar.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar.enable_steady_tick(Duration::from_millis(120));
        bar.set_message(RunState::Scanning.describe());
        Self { bar }
    }

    pub fn observe(&self, event: &ProgressEvent) {
        match event {
            ProgressEvent::Scanned { total, warnings } => {
                self.bar.set_style(
                    ProgressStyle::default_bar()
                        .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                        .unwrap_or_else(|_| ProgressStyle::default_bar())
                        .progress_chars("=>-"),
                );
                self.bar.set_length(*total as u64);
                self.bar.set_position(0);
                let mut message = event.describe();
                if *warnings > 0 {
                    message.push_str(&format!(" ({warnings} folder(s) unreadable)"));
                }
                self.bar.set_message(message);
            }
            ProgressEvent::FileCompleted {
                completed, report, ..
            } => {
                self.bar.set_position(*completed as u64);
                if let Some(name) = report.path.file_name() {
                    self.bar.set_message(name.to_string_lossy().into_owned());
                }
                if let FileOutcome::Failed { message, .. } = &report.outcome {
                    self.bar
                        .println(format!("failed: {}: {message}", report.path.display()));
                }
            }
            ProgressEvent::NoFilesFound => self.bar.set_message(event.describe()),
        }
    }

    pub fn finish(&self, status: &RunState) {
        match status {
            RunState::Aborted(_) => self.bar.abandon_with_message(status.describe()),
            _ => self.bar.finish_and_clear(),
        }
    }
}
