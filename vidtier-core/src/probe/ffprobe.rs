use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, trace};

use super::Prober;
use crate::config::SorterConfig;
use crate::error::{Result, SortError};

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// Arguments selecting the first video stream and printing only its height.
const HEIGHT_ARGS: &[&str] = &[
    "-v",
    "error",
    "-select_streams",
    "v:0",
    "-show_entries",
    "stream=height",
    "-of",
    "csv=p=0",
    "-i",
];

/// [`Prober`] backed by the `ffprobe` command line tool.
///
/// Every invocation runs as an isolated child with stdin and stderr
/// detached, and is killed once it exceeds the configured timeout.
#[derive(Debug, Clone)]
pub struct FfprobeProber {
    program: PathBuf,
    timeout: Duration,
}

impl FfprobeProber {
    pub fn new(program: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }

    pub fn from_config(config: &SorterConfig) -> Self {
        Self::new(config.ffprobe_path.clone(), config.probe_timeout())
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        #[cfg(windows)]
        cmd.creation_flags(CREATE_NO_WINDOW);
        cmd
    }

    fn unavailable(&self, reason: impl Into<String>) -> SortError {
        SortError::ToolUnavailable {
            tool: self.program.clone(),
            reason: reason.into(),
        }
    }

    /// Spawn `cmd` and wait for it, bounded by the timeout. The child is
    /// killed when the wait is abandoned.
    async fn run(&self, mut cmd: Command, path: &Path) -> Result<Output> {
        let child = cmd
            .spawn()
            .map_err(|err| self.unavailable(err.to_string()))?;

        match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(err)) => Err(SortError::ProcessError {
                path: path.to_path_buf(),
                detail: format!("failed to collect ffprobe output: {err}"),
            }),
            Err(_) => Err(SortError::Timeout {
                path: path.to_path_buf(),
                after: self.timeout,
            }),
        }
    }
}

#[async_trait]
impl Prober for FfprobeProber {
    fn name(&self) -> &'static str {
        "ffprobe"
    }

    async fn preflight(&self) -> Result<()> {
        let mut cmd = self.command();
        cmd.arg("-version");
        let output = match self.run(cmd, &self.program).await {
            Ok(output) => output,
            Err(SortError::Timeout { after, .. }) => {
                return Err(self.unavailable(format!("-version did not answer within {after:?}")));
            }
            Err(err) => return Err(err),
        };
        if !output.status.success() {
            return Err(self.unavailable(format!("-version exited with {}", output.status)));
        }
        debug!(tool = %self.program.display(), "probe tool available");
        Ok(())
    }

    async fn probe(&self, path: &Path) -> Result<u32> {
        let mut cmd = self.command();
        cmd.args(HEIGHT_ARGS).arg(path);

        let output = self.run(cmd, path).await?;
        if !output.status.success() {
            return Err(SortError::ProcessError {
                path: path.to_path_buf(),
                detail: format!("ffprobe exited with {}", output.status),
            });
        }

        let height = parse_height(&output.stdout, path)?;
        trace!(path = %path.display(), height, "probed");
        Ok(height)
    }
}

/// Parse ffprobe's `csv=p=0` output: the first token of the first non-empty
/// line, with anything after a comma or whitespace ignored. Empty output
/// means no video stream was selected.
pub fn parse_height(stdout: &[u8], path: &Path) -> Result<u32> {
    let text = String::from_utf8_lossy(stdout);
    let Some(line) = text.lines().map(str::trim).find(|line| !line.is_empty()) else {
        return Err(SortError::NoVideoStream(path.to_path_buf()));
    };

    let token = line
        .split(|c: char| c == ',' || c.is_whitespace())
        .next()
        .unwrap_or_default();

    match token.parse::<u32>() {
        Ok(0) => Err(SortError::ProcessError {
            path: path.to_path_buf(),
            detail: "reported a height of 0".to_string(),
        }),
        Ok(height) => Ok(height),
        Err(_) => Err(SortError::ProcessError {
            path: path.to_path_buf(),
            detail: format!("unexpected output '{line}'"),
        }),
    }
}
