//! Recursive discovery of candidate video files.

use std::collections::{HashSet, VecDeque};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Result, SortError};
use crate::fs::{EntryKind, FileSystem};
use crate::tier::Tier;

/// Extensions recognised as video files when no override is configured.
pub const DEFAULT_VIDEO_EXTENSIONS: &[&str] = &["mp4", "mkv", "avi", "mov", "flv", "wmv", "webm"];

pub fn default_video_extensions_vec() -> Vec<String> {
    DEFAULT_VIDEO_EXTENSIONS
        .iter()
        .map(|ext| ext.to_string())
        .collect()
}

/// A candidate file found under the batch root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoFile {
    pub path: PathBuf,
    /// Lowercase extension without the leading dot.
    pub extension: String,
}

impl VideoFile {
    pub fn file_name(&self) -> Option<&std::ffi::OsStr> {
        self.path.file_name()
    }
}

/// A subdirectory that could not be read; the scan carried on without it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanWarning {
    pub path: PathBuf,
    pub message: String,
}

/// Builds [`Discovery`] walks over a root folder.
#[derive(Clone)]
pub struct Discoverer {
    fs: Arc<dyn FileSystem>,
    extensions: HashSet<String>,
    include_tier_folders: bool,
}

impl std::fmt::Debug for Discoverer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Discoverer")
            .field("extensions", &self.extensions)
            .field("include_tier_folders", &self.include_tier_folders)
            .finish()
    }
}

impl Discoverer {
    pub fn new<I, S>(fs: Arc<dyn FileSystem>, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let extensions = extensions
            .into_iter()
            .map(|ext| normalize_extension(ext.as_ref()))
            .filter(|ext| !ext.is_empty())
            .collect();
        Self {
            fs,
            extensions,
            include_tier_folders: false,
        }
    }

    /// Walk into the `LOQ`/`HD`/... folders directly under the root as well.
    /// Off by default so a rerun does not revisit already sorted files.
    pub fn include_tier_folders(mut self, include: bool) -> Self {
        self.include_tier_folders = include;
        self
    }

    pub fn matches(&self, path: &Path) -> Option<String> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        self.extensions.contains(&ext).then_some(ext)
    }

    /// Start a walk over `root`. Fails when the root itself is not a readable
    /// directory; later directory errors become [`ScanWarning`]s.
    pub async fn discover(&self, root: &Path) -> Result<Discovery> {
        let scan_err = |source: io::Error| SortError::Scan {
            path: root.to_path_buf(),
            source,
        };

        let meta = self.fs.metadata(root).await.map_err(scan_err)?;
        if !meta.is_dir {
            return Err(scan_err(io::Error::new(
                io::ErrorKind::NotADirectory,
                "root is not a directory",
            )));
        }

        let mut discovery = Discovery {
            discoverer: self.clone(),
            root: root.to_path_buf(),
            pending_dirs: Vec::new(),
            pending_files: VecDeque::new(),
            warnings: Vec::new(),
        };
        discovery.expand(root).await.map_err(scan_err)?;
        Ok(discovery)
    }
}

fn normalize_extension(ext: &str) -> String {
    ext.trim().trim_start_matches('.').to_ascii_lowercase()
}

/// Lazy depth-first walk. Entries of each directory are visited in name
/// order, files before subdirectories, so the sequence is stable for a given
/// tree. Not restartable.
pub struct Discovery {
    discoverer: Discoverer,
    root: PathBuf,
    pending_dirs: Vec<PathBuf>,
    pending_files: VecDeque<VideoFile>,
    warnings: Vec<ScanWarning>,
}

impl std::fmt::Debug for Discovery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Discovery")
            .field("root", &self.root)
            .field("pending_dirs", &self.pending_dirs.len())
            .field("pending_files", &self.pending_files.len())
            .field("warnings", &self.warnings.len())
            .finish()
    }
}

impl Discovery {
    pub async fn next_video(&mut self) -> Option<VideoFile> {
        loop {
            if let Some(file) = self.pending_files.pop_front() {
                return Some(file);
            }
            let dir = self.pending_dirs.pop()?;
            if let Err(err) = self.expand(&dir).await {
                warn!(path = %dir.display(), error = %err, "skipping unreadable directory");
                self.warnings.push(ScanWarning {
                    path: dir,
                    message: err.to_string(),
                });
            }
        }
    }

    pub fn warnings(&self) -> &[ScanWarning] {
        &self.warnings
    }

    /// Drain the walk into a vector.
    pub async fn collect_all(mut self) -> (Vec<VideoFile>, Vec<ScanWarning>) {
        let mut files = Vec::new();
        while let Some(file) = self.next_video().await {
            files.push(file);
        }
        (files, self.warnings)
    }

    async fn expand(&mut self, dir: &Path) -> io::Result<()> {
        let mut rd = self.discoverer.fs.read_dir(dir).await?;
        let mut entries = Vec::new();
        while let Some(entry) = rd.next_entry().await? {
            entries.push(entry);
        }
        entries.sort_by(|a, b| a.path.cmp(&b.path));

        let mut subdirs = Vec::new();
        for entry in entries {
            match entry.kind {
                EntryKind::File => {
                    if let Some(extension) = self.discoverer.matches(&entry.path) {
                        self.pending_files.push_back(VideoFile {
                            path: entry.path,
                            extension,
                        });
                    }
                }
                EntryKind::Dir => {
                    if self.is_skipped_tier_folder(dir, &entry.path) {
                        debug!(path = %entry.path.display(), "not descending into tier folder");
                        continue;
                    }
                    subdirs.push(entry.path);
                }
                EntryKind::Other => {}
            }
        }
        // Stack: push in reverse so the first subdirectory is walked next.
        self.pending_dirs.extend(subdirs.into_iter().rev());
        Ok(())
    }

    fn is_skipped_tier_folder(&self, parent: &Path, dir: &Path) -> bool {
        !self.discoverer.include_tier_folders
            && parent == self.root
            && dir
                .file_name()
                .and_then(|name| name.to_str())
                .and_then(Tier::from_folder_name)
                .is_some()
    }
}
