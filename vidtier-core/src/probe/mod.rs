//! Resolution probing through an external media-inspection tool.

use std::path::Path;

use async_trait::async_trait;

use crate::error::Result;

pub mod ffprobe;

pub use ffprobe::FfprobeProber;

/// Extracts the height of a file's first video stream.
///
/// Implementations must be safe to share across worker tasks.
#[async_trait]
pub trait Prober: Send + Sync {
    /// Human-readable name identifying this prober implementation.
    fn name(&self) -> &'static str;

    /// Check once per run that the tool can be invoked at all. Fails with
    /// [`SortError::ToolUnavailable`](crate::error::SortError::ToolUnavailable)
    /// when it cannot.
    async fn preflight(&self) -> Result<()>;

    /// Height in pixels of the first video stream. Never zero.
    async fn probe(&self, path: &Path) -> Result<u32>;
}
