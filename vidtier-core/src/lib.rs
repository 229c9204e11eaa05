//! # vidtier core
//!
//! Sorts a folder of videos into resolution tier folders.
//!
//! A run discovers video files under a root folder, asks ffprobe for the
//! height of each file's first video stream, maps that height onto one of
//! five tiers and moves the file into `<root>/<TIER>/`.
//!
//! | Tier  | Height         |
//! |-------|----------------|
//! | `LOQ` | below 720      |
//! | `HD`  | 720 to 1079    |
//! | `FHD` | 1080 to 1439   |
//! | `QHD` | 1440 to 2159   |
//! | `4K`  | 2160 and above |
//!
//! ## Architecture
//!
//! - [`discover`]: lazy, ordered walk that yields matching video files
//! - [`probe`]: the [`Prober`] seam and its ffprobe implementation
//! - [`tier`]: the tier table and height classification
//! - [`relocate`]: collision-safe moves with a cross-device fallback
//! - [`orchestrator`]: run lifecycle, worker pool, progress and cancellation
//! - [`fs`]: filesystem seam with a real and an in-memory backend
//!
//! ## Example
//!
//! ```no_run
//! use vidtier_core::{Orchestrator, SorterConfig};
//!
//! # async fn run() -> vidtier_core::Result<()> {
//! let orchestrator = Orchestrator::with_ffprobe(SorterConfig::default());
//! let mut handle = orchestrator.start_run("/videos").await?;
//! while let Some(event) = handle.next_event().await {
//!     println!("{}", event.describe());
//! }
//! let result = handle.wait().await?;
//! print!("{}", result.summary(5));
//! # Ok(())
//! # }
//! ```
#![allow(missing_docs)]

pub mod batch;
pub mod config;
pub mod discover;
pub mod error;
pub mod events;
pub mod fs;
pub mod orchestrator;
pub mod probe;
pub mod relocate;
pub mod tier;

pub use batch::{BatchResult, FailureRecord};
pub use config::SorterConfig;
pub use discover::{DEFAULT_VIDEO_EXTENSIONS, Discoverer, ScanWarning, VideoFile};
pub use error::{ErrorKind, Result, SortError};
pub use events::{AbortReason, FileOutcome, FileReport, ProgressEvent, RunState};
pub use fs::{FileSystem, InMemoryFs, RealFs};
pub use orchestrator::{Canceller, Orchestrator, RunHandle};
pub use probe::{FfprobeProber, Prober};
pub use relocate::{MoveMethod, Relocation, Relocator};
pub use tier::{Tier, classify};
