//! Collision-safe moves into tier folders.
//!
//! Moves into one destination folder are serialized, so the collision check
//! and the write happen as one step with respect to other workers. Same-volume
//! moves are a single `rename`. Cross-volume moves copy into a hidden partial
//! file next to the destination, verify it against the source, rename it into
//! place and only then delete the source.

use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::{Result, SortError};
use crate::fs::FileSystem;
use crate::tier::Tier;

const PARTIAL_SUFFIX: &str = ".vidtier-partial";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MoveMethod {
    Rename,
    CopyThenDelete,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Relocation {
    Moved {
        destination: PathBuf,
        method: MoveMethod,
    },
    /// The file already lives in the destination folder.
    AlreadyInPlace { destination: PathBuf },
}

/// Path of the folder `tier` is sorted into under `root`.
pub fn tier_dir(root: &Path, tier: Tier) -> PathBuf {
    root.join(tier.folder_name())
}

pub struct Relocator {
    fs: Arc<dyn FileSystem>,
    locks: DashMap<PathBuf, Arc<Mutex<()>>>,
}

impl std::fmt::Debug for Relocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Relocator")
            .field("locked_destinations", &self.locks.len())
            .finish()
    }
}

impl Relocator {
    pub fn new(fs: Arc<dyn FileSystem>) -> Self {
        Self {
            fs,
            locks: DashMap::new(),
        }
    }

    fn lock_for(&self, dir: &Path) -> Arc<Mutex<()>> {
        self.locks
            .entry(dir.to_path_buf())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Move `source` into `dest_dir`, keeping its base name. The folder is
    /// created on demand. An occupied destination name is a
    /// [`SortError::Collision`]; the source is never modified on failure.
    pub async fn relocate(&self, source: &Path, dest_dir: &Path) -> Result<Relocation> {
        let file_name = source.file_name().ok_or_else(|| {
            SortError::io(
                source,
                io::Error::new(io::ErrorKind::InvalidInput, "path has no file name"),
            )
        })?;
        let destination = dest_dir.join(file_name);

        if source.parent() == Some(dest_dir) {
            return Ok(Relocation::AlreadyInPlace { destination });
        }

        let lock = self.lock_for(dest_dir);
        let result = {
            let _guard = lock.lock().await;
            self.move_locked(source, dest_dir, destination).await
        };
        drop(lock);
        self.release_lock(dest_dir);
        result
    }

    /// Forget the lock for `dir` unless another task still holds a handle.
    fn release_lock(&self, dir: &Path) {
        self.locks.remove_if(dir, |_, lock| Arc::strong_count(lock) == 1);
    }

    /// Number of destination folders with a live lock entry.
    pub fn tracked_destinations(&self) -> usize {
        self.locks.len()
    }

    async fn move_locked(
        &self,
        source: &Path,
        dest_dir: &Path,
        destination: PathBuf,
    ) -> Result<Relocation> {
        self.fs
            .create_dir_all(dest_dir)
            .await
            .map_err(|err| SortError::io(dest_dir, err))?;

        let occupied = self
            .fs
            .entry_exists(&destination)
            .await
            .map_err(|err| SortError::io(&destination, err))?;
        if occupied {
            return Err(SortError::Collision { destination });
        }

        match self.fs.rename(source, &destination).await {
            Ok(()) => {
                debug!(from = %source.display(), to = %destination.display(), "renamed");
                Ok(Relocation::Moved {
                    destination,
                    method: MoveMethod::Rename,
                })
            }
            Err(err) if err.kind() == io::ErrorKind::CrossesDevices => {
                self.copy_across(source, &destination).await?;
                debug!(from = %source.display(), to = %destination.display(), "copied across devices");
                Ok(Relocation::Moved {
                    destination,
                    method: MoveMethod::CopyThenDelete,
                })
            }
            Err(err) => Err(SortError::io(source, err)),
        }
    }

    async fn copy_across(&self, source: &Path, destination: &Path) -> Result<()> {
        let partial = partial_path(destination);

        if let Err(err) = self.copy_verified(source, &partial, destination).await {
            if let Err(cleanup) = self.fs.remove_file(&partial).await
                && cleanup.kind() != io::ErrorKind::NotFound
            {
                warn!(path = %partial.display(), error = %cleanup, "failed to remove partial copy");
            }
            return Err(SortError::io(source, err));
        }

        if let Err(err) = self.fs.remove_file(source).await {
            // Keep exactly one copy: undo the destination rather than leave a duplicate.
            if let Err(rollback) = self.fs.remove_file(destination).await {
                warn!(
                    path = %destination.display(),
                    error = %rollback,
                    "failed to roll back copy after source removal failed"
                );
            }
            return Err(SortError::io(source, err));
        }
        Ok(())
    }

    async fn copy_verified(&self, source: &Path, partial: &Path, destination: &Path) -> io::Result<()> {
        let copied = self.fs.copy(source, partial).await?;
        let expected = self.fs.metadata(source).await?.len;
        if copied != expected || self.fs.metadata(partial).await?.len != expected {
            return Err(io::Error::other(format!(
                "copy length mismatch: expected {expected} bytes, wrote {copied}"
            )));
        }

        let source_digest = self.fs.sha256(source).await?;
        let copy_digest = self.fs.sha256(partial).await?;
        if source_digest != copy_digest {
            return Err(io::Error::other("copy digest does not match source"));
        }

        self.fs.rename(partial, destination).await
    }
}

fn partial_path(destination: &Path) -> PathBuf {
    let mut name = OsString::from(".");
    if let Some(file_name) = destination.file_name() {
        name.push(file_name);
    }
    name.push(PARTIAL_SUFFIX);
    destination.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::fs::{InMemoryFs, RealFs};

    #[tokio::test]
    async fn renames_into_new_tier_folder() {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path();
        std::fs::create_dir_all(root.join("sub")).expect("mkdir");
        let source = root.join("sub/a.mp4");
        std::fs::write(&source, b"video").expect("write");

        let relocator = Relocator::new(Arc::new(RealFs::new()));
        let dest_dir = tier_dir(root, Tier::Fhd);
        let relocation = relocator.relocate(&source, &dest_dir).await.expect("move");

        assert_eq!(
            relocation,
            Relocation::Moved {
                destination: root.join("FHD/a.mp4"),
                method: MoveMethod::Rename,
            }
        );
        assert!(!source.exists());
        assert_eq!(std::fs::read(root.join("FHD/a.mp4")).expect("read"), b"video");
    }

    #[tokio::test]
    async fn collision_leaves_source_untouched() {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path();
        std::fs::create_dir_all(root.join("HD")).expect("mkdir");
        std::fs::write(root.join("HD/a.mp4"), b"already here").expect("write");
        let source = root.join("a.mp4");
        std::fs::write(&source, b"incoming").expect("write");

        let relocator = Relocator::new(Arc::new(RealFs::new()));
        let err = relocator
            .relocate(&source, &tier_dir(root, Tier::Hd))
            .await
            .expect_err("collision");

        assert_eq!(err.kind(), ErrorKind::CollisionError);
        assert_eq!(std::fs::read(&source).expect("read"), b"incoming");
        assert_eq!(std::fs::read(root.join("HD/a.mp4")).expect("read"), b"already here");
    }

    #[tokio::test]
    async fn file_already_in_tier_folder_is_left_alone() {
        let fs = InMemoryFs::new();
        fs.add_file("/r/QHD/a.mkv", b"v".to_vec());
        let relocator = Relocator::new(Arc::new(fs.clone()));

        let relocation = relocator
            .relocate(Path::new("/r/QHD/a.mkv"), Path::new("/r/QHD"))
            .await
            .expect("relocate");
        assert_eq!(
            relocation,
            Relocation::AlreadyInPlace {
                destination: PathBuf::from("/r/QHD/a.mkv")
            }
        );
        assert!(fs.exists(Path::new("/r/QHD/a.mkv")));
    }

    #[tokio::test]
    async fn cross_device_move_copies_then_deletes() {
        let fs = InMemoryFs::new();
        fs.add_file("/r/in/a.mp4", b"0123456789".to_vec());
        fs.add_mount("/r/LOQ");
        let relocator = Relocator::new(Arc::new(fs.clone()));

        let relocation = relocator
            .relocate(Path::new("/r/in/a.mp4"), Path::new("/r/LOQ"))
            .await
            .expect("relocate");

        assert_eq!(
            relocation,
            Relocation::Moved {
                destination: PathBuf::from("/r/LOQ/a.mp4"),
                method: MoveMethod::CopyThenDelete,
            }
        );
        assert!(!fs.exists(Path::new("/r/in/a.mp4")));
        assert_eq!(
            fs.contents(Path::new("/r/LOQ/a.mp4")),
            Some(b"0123456789".to_vec())
        );
        assert!(!fs.exists(Path::new("/r/LOQ/.a.mp4.vidtier-partial")));
    }

    #[tokio::test]
    async fn failed_copy_verification_keeps_source() {
        let fs = InMemoryFs::new();
        fs.add_file("/r/in/a.mp4", b"0123456789".to_vec());
        fs.add_mount("/r/LOQ");
        fs.set_short_copies(true);
        let relocator = Relocator::new(Arc::new(fs.clone()));

        let err = relocator
            .relocate(Path::new("/r/in/a.mp4"), Path::new("/r/LOQ"))
            .await
            .expect_err("short copy");

        assert_eq!(err.kind(), ErrorKind::IoError);
        assert_eq!(
            fs.contents(Path::new("/r/in/a.mp4")),
            Some(b"0123456789".to_vec())
        );
        assert_eq!(fs.files(), vec![PathBuf::from("/r/in/a.mp4")]);
    }

    #[tokio::test]
    async fn undeletable_source_rolls_back_cross_device_copy() {
        let fs = InMemoryFs::new();
        fs.add_file("/r/locked/a.mp4", b"0123456789".to_vec());
        fs.deny_write("/r/locked");
        fs.add_mount("/r/FHD");
        let relocator = Relocator::new(Arc::new(fs.clone()));

        let err = relocator
            .relocate(Path::new("/r/locked/a.mp4"), Path::new("/r/FHD"))
            .await
            .expect_err("source cannot be removed");

        assert_eq!(err.kind(), ErrorKind::IoError);
        assert_eq!(fs.files(), vec![PathBuf::from("/r/locked/a.mp4")]);
        assert_eq!(
            fs.contents(Path::new("/r/locked/a.mp4")),
            Some(b"0123456789".to_vec())
        );
    }

    #[tokio::test]
    async fn permission_error_is_io_and_source_survives() {
        let fs = InMemoryFs::new();
        fs.add_file("/r/a.mp4", b"v".to_vec());
        fs.deny_write("/r/HD");
        let relocator = Relocator::new(Arc::new(fs.clone()));

        let err = relocator
            .relocate(Path::new("/r/a.mp4"), Path::new("/r/HD"))
            .await
            .expect_err("read-only");

        assert_eq!(err.kind(), ErrorKind::IoError);
        assert!(fs.exists(Path::new("/r/a.mp4")));
    }

    #[tokio::test]
    async fn concurrent_same_name_moves_cannot_both_win() {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path();
        for sub in ["one", "two"] {
            std::fs::create_dir_all(root.join(sub)).expect("mkdir");
            std::fs::write(root.join(sub).join("clip.mp4"), sub.as_bytes()).expect("write");
        }

        let relocator = Arc::new(Relocator::new(Arc::new(RealFs::new())));
        let dest = tier_dir(root, Tier::Hd);
        let first = root.join("one/clip.mp4");
        let second = root.join("two/clip.mp4");
        let (a, b) = tokio::join!(
            relocator.relocate(&first, &dest),
            relocator.relocate(&second, &dest),
        );

        let outcomes = [a, b];
        let moved = outcomes.iter().filter(|r| r.is_ok()).count();
        let collided = outcomes
            .iter()
            .filter(|r| matches!(r, Err(SortError::Collision { .. })))
            .count();
        assert_eq!((moved, collided), (1, 1));

        let left_behind = ["one", "two"]
            .iter()
            .filter(|sub| root.join(sub).join("clip.mp4").exists())
            .count();
        assert_eq!(left_behind, 1);
        assert!(root.join("HD/clip.mp4").exists());
    }

    #[tokio::test]
    async fn destination_locks_are_released_after_each_move() {
        let fs = InMemoryFs::new();
        fs.add_file("/r/a.mp4", b"a".to_vec());
        fs.add_file("/r/b.mp4", b"b".to_vec());
        fs.add_file("/other/c.mp4", b"c".to_vec());
        let relocator = Arc::new(Relocator::new(Arc::new(fs.clone())));

        relocator
            .relocate(Path::new("/r/a.mp4"), Path::new("/r/HD"))
            .await
            .expect("move a");
        assert_eq!(relocator.tracked_destinations(), 0);

        let (b, c) = tokio::join!(
            relocator.relocate(Path::new("/r/b.mp4"), Path::new("/r/HD")),
            relocator.relocate(Path::new("/other/c.mp4"), Path::new("/other/4K")),
        );
        b.expect("move b");
        c.expect("move c");
        assert_eq!(relocator.tracked_destinations(), 0);

        fs.add_file("/r/d.mp4", b"d".to_vec());
        fs.add_file("/r/QHD/d.mp4", b"taken".to_vec());
        relocator
            .relocate(Path::new("/r/d.mp4"), Path::new("/r/QHD"))
            .await
            .expect_err("collision");
        assert_eq!(relocator.tracked_destinations(), 0);
    }

    #[test]
    fn partial_file_is_hidden_sibling() {
        assert_eq!(
            partial_path(Path::new("/r/HD/a.mp4")),
            PathBuf::from("/r/HD/.a.mp4.vidtier-partial")
        );
    }
}
