use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use vidtier_core::SorterConfig;

#[derive(Debug, Parser)]
#[command(
    name = "vidtierctl",
    version,
    about = "Sort videos into resolution tier folders (LOQ, HD, FHD, QHD, 4K)"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Probe every video under ROOT and move it into ROOT/<TIER>/
    Sort(SortArgs),
    /// Print the tier table
    Tiers,
    /// Check that ffprobe can be invoked
    Check(CheckArgs),
}

#[derive(Debug, Args)]
pub struct SortArgs {
    /// Folder to sort
    pub root: PathBuf,
    /// ffprobe executable (default: `ffprobe` on PATH)
    #[arg(long, value_name = "PATH")]
    pub ffprobe: Option<PathBuf>,
    /// Number of files probed and moved concurrently
    #[arg(long, value_name = "N")]
    pub workers: Option<usize>,
    /// Per-file probe limit, e.g. `30s` or `2m`
    #[arg(long, value_name = "DURATION", value_parser = humantime::parse_duration)]
    pub probe_timeout: Option<Duration>,
    /// Config file (TOML or JSON); overrides VIDTIER_CONFIG_PATH and default files
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,
    /// Also re-check files already inside ROOT's tier folders
    #[arg(long)]
    pub rescan_tier_folders: bool,
    /// Print the batch result as JSON instead of a summary
    #[arg(long)]
    pub json: bool,
    /// How many failures to list in the summary
    #[arg(long, value_name = "N", default_value_t = 5)]
    pub failures: usize,
}

impl SortArgs {
    /// Flags take precedence over every config source.
    pub fn apply(&self, config: &mut SorterConfig) {
        if let Some(ffprobe) = &self.ffprobe {
            config.ffprobe_path = ffprobe.clone();
        }
        if let Some(workers) = self.workers {
            config.workers = Some(workers);
        }
        if let Some(timeout) = self.probe_timeout {
            config.probe_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        }
        if self.rescan_tier_folders {
            config.rescan_tier_folders = true;
        }
    }
}

#[derive(Debug, Args)]
pub struct CheckArgs {
    /// ffprobe executable to check
    #[arg(long, value_name = "PATH")]
    pub ffprobe: Option<PathBuf>,
    /// Config file (TOML or JSON)
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn flags_override_loaded_config() {
        let cli = Cli::parse_from([
            "vidtierctl",
            "sort",
            "/videos",
            "--workers",
            "3",
            "--probe-timeout",
            "45s",
            "--rescan-tier-folders",
        ]);
        let Command::Sort(args) = cli.command else {
            panic!("expected sort");
        };

        let mut config = SorterConfig::default();
        args.apply(&mut config);
        assert_eq!(config.workers, Some(3));
        assert_eq!(config.probe_timeout_ms, 45_000);
        assert!(config.rescan_tier_folders);
        assert_eq!(config.ffprobe_path, PathBuf::from("ffprobe"));
        assert_eq!(args.failures, 5);
    }
}
