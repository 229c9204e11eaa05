use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::io::AsyncReadExt;

/// Minimal async filesystem abstraction used by discovery and relocation.
#[async_trait]
pub trait FileSystem: Send + Sync {
    /// Resolve a path to its absolute, symlink-free form.
    async fn canonicalize(&self, path: &Path) -> io::Result<PathBuf>;

    /// Fetch lightweight metadata, following symlinks.
    async fn metadata(&self, path: &Path) -> io::Result<FsMetadata>;

    /// Whether anything (file, directory, dangling symlink) occupies `path`.
    async fn entry_exists(&self, path: &Path) -> io::Result<bool>;

    /// Open a directory for iteration.
    async fn read_dir(&self, path: &Path) -> io::Result<Box<dyn ReadDirStream + Send>>;

    /// Create a directory and its parents. Succeeds if it already exists.
    async fn create_dir_all(&self, path: &Path) -> io::Result<()>;

    async fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;

    async fn copy(&self, from: &Path, to: &Path) -> io::Result<u64>;

    async fn remove_file(&self, path: &Path) -> io::Result<()>;

    /// SHA-256 of the file's contents.
    async fn sha256(&self, path: &Path) -> io::Result<[u8; 32]>;
}

/// Lightweight metadata needed by the sorter.
#[derive(Debug, Clone, Copy)]
pub struct FsMetadata {
    pub is_dir: bool,
    pub is_file: bool,
    pub len: u64,
    /// Last modified time if available
    pub modified: Option<std::time::SystemTime>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Dir,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FsEntry {
    pub path: PathBuf,
    pub kind: EntryKind,
}

/// Async directory iterator (similar to tokio::fs::ReadDir).
#[async_trait]
pub trait ReadDirStream {
    /// Return the next entry, or None when exhausted.
    async fn next_entry(&mut self) -> io::Result<Option<FsEntry>>;
}

/// Real filesystem implementation backed by tokio::fs.
#[derive(Debug, Default, Clone, Copy)]
pub struct RealFs;

impl RealFs {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl FileSystem for RealFs {
    async fn canonicalize(&self, path: &Path) -> io::Result<PathBuf> {
        tokio::fs::canonicalize(path).await
    }

    async fn metadata(&self, path: &Path) -> io::Result<FsMetadata> {
        let md = tokio::fs::metadata(path).await?;
        Ok(FsMetadata {
            is_dir: md.is_dir(),
            is_file: md.is_file(),
            len: md.len(),
            modified: md.modified().ok(),
        })
    }

    async fn entry_exists(&self, path: &Path) -> io::Result<bool> {
        // symlink_metadata so a dangling link still counts as an occupant
        match tokio::fs::symlink_metadata(path).await {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn read_dir(&self, path: &Path) -> io::Result<Box<dyn ReadDirStream + Send>> {
        let rd = tokio::fs::read_dir(path).await?;
        Ok(Box::new(RealReadDir { inner: rd }))
    }

    async fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        tokio::fs::create_dir_all(path).await
    }

    async fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        tokio::fs::rename(from, to).await
    }

    async fn copy(&self, from: &Path, to: &Path) -> io::Result<u64> {
        tokio::fs::copy(from, to).await
    }

    async fn remove_file(&self, path: &Path) -> io::Result<()> {
        tokio::fs::remove_file(path).await
    }

    async fn sha256(&self, path: &Path) -> io::Result<[u8; 32]> {
        let mut file = tokio::fs::File::open(path).await?;
        let mut hasher = Sha256::new();
        let mut buf = vec![0u8; 64 * 1024];
        loop {
            let n = file.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
        Ok(hasher.finalize().into())
    }
}

struct RealReadDir {
    inner: tokio::fs::ReadDir,
}

#[async_trait]
impl ReadDirStream for RealReadDir {
    async fn next_entry(&mut self) -> io::Result<Option<FsEntry>> {
        let Some(entry) = self.inner.next_entry().await? else {
            return Ok(None);
        };
        let path = entry.path();
        let file_type = entry.file_type().await?;
        let kind = if file_type.is_dir() {
            EntryKind::Dir
        } else if file_type.is_file() {
            EntryKind::File
        } else if file_type.is_symlink() {
            // Links to files are sorted like files; linked directories are not followed.
            match tokio::fs::metadata(&path).await {
                Ok(md) if md.is_file() => EntryKind::File,
                _ => EntryKind::Other,
            }
        } else {
            EntryKind::Other
        };
        Ok(Some(FsEntry { path, kind }))
    }
}

/// In-memory filesystem for tests.
///
/// Paths are treated literally; callers should use consistent absolute paths.
/// Besides plain files and directories it can simulate separate devices
/// (renames across them fail with `CrossesDevices`), unreadable directories,
/// read-only subtrees and copies that come out short.
#[derive(Debug, Default, Clone)]
pub struct InMemoryFs {
    inner: Arc<Mutex<InMemoryState>>,
}

#[derive(Debug, Default)]
struct InMemoryState {
    nodes: HashMap<PathBuf, Node>,
    mounts: Vec<PathBuf>,
    unreadable: HashSet<PathBuf>,
    read_only: Vec<PathBuf>,
    short_copies: bool,
}

#[derive(Debug, Clone)]
enum Node {
    Dir { children: Vec<PathBuf> },
    File { contents: Vec<u8> },
}

impl InMemoryFs {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, InMemoryState> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn add_dir<P: Into<PathBuf>>(&self, path: P) {
        let path = path.into();
        let mut state = self.state();
        if state.nodes.contains_key(&path) {
            return;
        }
        state.ensure_parent_link(&path);
        state.nodes.insert(
            path,
            Node::Dir {
                children: Vec::new(),
            },
        );
    }

    pub fn add_file<P: Into<PathBuf>>(&self, path: P, contents: impl Into<Vec<u8>>) {
        let path = path.into();
        let mut state = self.state();
        state.ensure_parent_link(&path);
        state.nodes.insert(
            path,
            Node::File {
                contents: contents.into(),
            },
        );
    }

    /// Treat everything under `path` as a separate device.
    pub fn add_mount<P: Into<PathBuf>>(&self, path: P) {
        let path = path.into();
        self.add_dir(path.clone());
        self.state().mounts.push(path);
    }

    /// Make `read_dir` on `path` fail with `PermissionDenied`.
    pub fn deny_read<P: Into<PathBuf>>(&self, path: P) {
        self.state().unreadable.insert(path.into());
    }

    /// Reject writes anywhere under `path` with `PermissionDenied`.
    pub fn deny_write<P: Into<PathBuf>>(&self, path: P) {
        self.state().read_only.push(path.into());
    }

    /// Drop the last byte of every subsequent copy.
    pub fn set_short_copies(&self, short: bool) {
        self.state().short_copies = short;
    }

    pub fn contents(&self, path: &Path) -> Option<Vec<u8>> {
        match self.state().nodes.get(path) {
            Some(Node::File { contents }) => Some(contents.clone()),
            _ => None,
        }
    }

    pub fn exists(&self, path: &Path) -> bool {
        self.state().nodes.contains_key(path)
    }

    /// All file paths, sorted.
    pub fn files(&self) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = self
            .state()
            .nodes
            .iter()
            .filter(|(_, node)| matches!(node, Node::File { .. }))
            .map(|(path, _)| path.clone())
            .collect();
        files.sort();
        files
    }
}

impl InMemoryState {
    fn ensure_parent_link(&mut self, path: &Path) {
        if let Some(parent) = path.parent() {
            // Ensure parent directory exists
            if !self.nodes.contains_key(parent) {
                self.nodes.insert(
                    parent.to_path_buf(),
                    Node::Dir {
                        children: Vec::new(),
                    },
                );
                // Recurse to ensure its parent exists
                self.ensure_parent_link(parent);
            }
            // Link child into parent
            if let Some(Node::Dir { children }) = self.nodes.get_mut(parent)
                && !children.iter().any(|p| p.as_path() == path)
            {
                children.push(path.to_path_buf());
            }
        }
    }

    fn unlink_from_parent(&mut self, path: &Path) {
        if let Some(parent) = path.parent()
            && let Some(Node::Dir { children }) = self.nodes.get_mut(parent)
        {
            children.retain(|p| p.as_path() != path);
        }
    }

    fn device_of(&self, path: &Path) -> usize {
        self.mounts
            .iter()
            .enumerate()
            .filter(|(_, mount)| path.starts_with(mount))
            .max_by_key(|(_, mount)| mount.components().count())
            .map(|(idx, _)| idx + 1)
            .unwrap_or(0)
    }

    fn check_writable(&self, path: &Path) -> io::Result<()> {
        if self.read_only.iter().any(|root| path.starts_with(root)) {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("read-only: {}", path.display()),
            ));
        }
        Ok(())
    }

    fn check_parent_dir(&self, path: &Path) -> io::Result<()> {
        match path.parent().and_then(|parent| self.nodes.get(parent)) {
            Some(Node::Dir { .. }) => Ok(()),
            _ => Err(not_found(path)),
        }
    }

    fn file_contents(&self, path: &Path) -> io::Result<&Vec<u8>> {
        match self.nodes.get(path) {
            Some(Node::File { contents }) => Ok(contents),
            Some(Node::Dir { .. }) => Err(io::Error::new(
                io::ErrorKind::IsADirectory,
                format!("is a directory: {}", path.display()),
            )),
            None => Err(not_found(path)),
        }
    }

    fn put_file(&mut self, path: &Path, contents: Vec<u8>) {
        self.ensure_parent_link(path);
        self.nodes
            .insert(path.to_path_buf(), Node::File { contents });
    }
}

fn not_found(path: &Path) -> io::Error {
    io::Error::new(
        io::ErrorKind::NotFound,
        format!("no such path: {}", path.display()),
    )
}

#[async_trait]
impl FileSystem for InMemoryFs {
    async fn canonicalize(&self, path: &Path) -> io::Result<PathBuf> {
        if self.state().nodes.contains_key(path) {
            Ok(path.to_path_buf())
        } else {
            Err(not_found(path))
        }
    }

    async fn metadata(&self, path: &Path) -> io::Result<FsMetadata> {
        match self.state().nodes.get(path) {
            Some(Node::Dir { .. }) => Ok(FsMetadata {
                is_dir: true,
                is_file: false,
                len: 0,
                modified: None,
            }),
            Some(Node::File { contents }) => Ok(FsMetadata {
                is_dir: false,
                is_file: true,
                len: contents.len() as u64,
                modified: None,
            }),
            None => Err(not_found(path)),
        }
    }

    async fn entry_exists(&self, path: &Path) -> io::Result<bool> {
        Ok(self.state().nodes.contains_key(path))
    }

    async fn read_dir(&self, path: &Path) -> io::Result<Box<dyn ReadDirStream + Send>> {
        let state = self.state();
        if state.unreadable.contains(path) {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("permission denied: {}", path.display()),
            ));
        }
        match state.nodes.get(path) {
            Some(Node::Dir { children }) => {
                let queue = children
                    .iter()
                    .map(|child| FsEntry {
                        path: child.clone(),
                        kind: match state.nodes.get(child) {
                            Some(Node::Dir { .. }) => EntryKind::Dir,
                            Some(Node::File { .. }) => EntryKind::File,
                            None => EntryKind::Other,
                        },
                    })
                    .collect();
                Ok(Box::new(InMemReadDir { queue }))
            }
            Some(Node::File { .. }) => Err(io::Error::new(
                io::ErrorKind::NotADirectory,
                format!("read_dir on file: {}", path.display()),
            )),
            None => Err(not_found(path)),
        }
    }

    async fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        let mut state = self.state();
        match state.nodes.get(path) {
            Some(Node::Dir { .. }) => return Ok(()),
            Some(Node::File { .. }) => {
                return Err(io::Error::new(
                    io::ErrorKind::AlreadyExists,
                    format!("file in the way: {}", path.display()),
                ));
            }
            None => {}
        }
        state.check_writable(path)?;
        state.ensure_parent_link(path);
        state.nodes.insert(
            path.to_path_buf(),
            Node::Dir {
                children: Vec::new(),
            },
        );
        Ok(())
    }

    async fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        let mut state = self.state();
        let contents = state.file_contents(from)?.clone();
        // Device mismatch is reported before permissions, as rename(2) does.
        if state.device_of(from) != state.device_of(to) {
            return Err(io::Error::new(
                io::ErrorKind::CrossesDevices,
                format!("{} and {} are on different devices", from.display(), to.display()),
            ));
        }
        state.check_writable(from)?;
        state.check_writable(to)?;
        state.check_parent_dir(to)?;
        state.nodes.remove(from);
        state.unlink_from_parent(from);
        state.put_file(to, contents);
        Ok(())
    }

    async fn copy(&self, from: &Path, to: &Path) -> io::Result<u64> {
        let mut state = self.state();
        let mut contents = state.file_contents(from)?.clone();
        state.check_writable(to)?;
        state.check_parent_dir(to)?;
        if state.short_copies {
            contents.pop();
        }
        let len = contents.len() as u64;
        state.put_file(to, contents);
        Ok(len)
    }

    async fn remove_file(&self, path: &Path) -> io::Result<()> {
        let mut state = self.state();
        state.file_contents(path)?;
        state.check_writable(path)?;
        state.nodes.remove(path);
        state.unlink_from_parent(path);
        Ok(())
    }

    async fn sha256(&self, path: &Path) -> io::Result<[u8; 32]> {
        let state = self.state();
        let contents = state.file_contents(path)?;
        Ok(Sha256::digest(contents).into())
    }
}

struct InMemReadDir {
    queue: std::collections::VecDeque<FsEntry>,
}

#[async_trait]
impl ReadDirStream for InMemReadDir {
    async fn next_entry(&mut self) -> io::Result<Option<FsEntry>> {
        Ok(self.queue.pop_front())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn in_memory_rename_moves_contents() {
        let fs = InMemoryFs::new();
        fs.add_file("/root/a.mp4", b"abc".to_vec());
        fs.add_dir("/root/HD");

        fs.rename(Path::new("/root/a.mp4"), Path::new("/root/HD/a.mp4"))
            .await
            .expect("rename");

        assert!(!fs.exists(Path::new("/root/a.mp4")));
        assert_eq!(fs.contents(Path::new("/root/HD/a.mp4")), Some(b"abc".to_vec()));

        let mut rd = fs.read_dir(Path::new("/root")).await.expect("read_dir");
        let mut names = Vec::new();
        while let Some(entry) = rd.next_entry().await.expect("entry") {
            names.push(entry.path);
        }
        assert_eq!(names, vec![PathBuf::from("/root/HD")]);
    }

    #[tokio::test]
    async fn in_memory_rename_across_mounts_fails() {
        let fs = InMemoryFs::new();
        fs.add_file("/root/a.mp4", b"abc".to_vec());
        fs.add_mount("/root/HD");

        let err = fs
            .rename(Path::new("/root/a.mp4"), Path::new("/root/HD/a.mp4"))
            .await
            .expect_err("cross-device rename");
        assert_eq!(err.kind(), io::ErrorKind::CrossesDevices);
        assert!(fs.exists(Path::new("/root/a.mp4")));
    }

    #[tokio::test]
    async fn in_memory_digest_matches_real_digest() {
        let dir = tempfile::tempdir().expect("tempdir");
        let real_path = dir.path().join("clip.mkv");
        std::fs::write(&real_path, b"frame data").expect("write");

        let mem = InMemoryFs::new();
        mem.add_file("/clip.mkv", b"frame data".to_vec());

        let real = RealFs::new().sha256(&real_path).await.expect("real digest");
        let fake = mem.sha256(Path::new("/clip.mkv")).await.expect("mem digest");
        assert_eq!(real, fake);
    }

    #[tokio::test]
    async fn real_entry_exists_sees_files_and_absence() {
        let dir = tempfile::tempdir().expect("tempdir");
        let fs = RealFs::new();
        let path = dir.path().join("x.mp4");
        assert!(!fs.entry_exists(&path).await.expect("exists"));
        std::fs::write(&path, b"x").expect("write");
        assert!(fs.entry_exists(&path).await.expect("exists"));
    }
}
