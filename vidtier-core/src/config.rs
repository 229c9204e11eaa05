use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::discover::default_video_extensions_vec;

pub const DEFAULT_PROBE_TIMEOUT_MS: u64 = 30_000;

fn default_ffprobe_path() -> PathBuf {
    PathBuf::from("ffprobe")
}

fn default_probe_timeout_ms() -> u64 {
    DEFAULT_PROBE_TIMEOUT_MS
}

/// Knobs consumed by the [`Orchestrator`](crate::orchestrator::Orchestrator).
///
/// Every field has a default, so partial config files and inline JSON
/// overrides only need to name what they change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SorterConfig {
    /// ffprobe executable; a bare name is resolved through `PATH`.
    #[serde(default = "default_ffprobe_path")]
    pub ffprobe_path: PathBuf,
    /// Worker pool size. `None` means twice the number of CPUs.
    pub workers: Option<usize>,
    /// Wall-clock limit for a single probe (milliseconds).
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
    /// Extensions treated as video files, case-insensitive.
    #[serde(default = "default_video_extensions_vec")]
    pub video_extensions: Vec<String>,
    /// Re-probe files already inside the root's tier folders and move any
    /// that sit in the wrong one.
    pub rescan_tier_folders: bool,
}

impl Default for SorterConfig {
    fn default() -> Self {
        Self {
            ffprobe_path: default_ffprobe_path(),
            workers: None,
            probe_timeout_ms: DEFAULT_PROBE_TIMEOUT_MS,
            video_extensions: default_video_extensions_vec(),
            rescan_tier_folders: false,
        }
    }
}

impl SorterConfig {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms.max(1))
    }

    /// Effective worker count, never below one.
    pub fn worker_count(&self) -> usize {
        self.workers
            .unwrap_or_else(|| num_cpus::get().saturating_mul(2))
            .max(1)
    }
}
