#![allow(dead_code)]

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::{Mutex, MutexGuard};
use vidtier_core::{Prober, Result, SortError};

static SERIAL: Mutex<()> = Mutex::const_new(());

/// Tests that write and then execute scripts hold this for their whole body,
/// so no other test forks while a script file is still open for writing.
pub async fn serial() -> MutexGuard<'static, ()> {
    SERIAL.lock().await
}

/// ffprobe stand-in: answers `-version` and prints the probed file's contents.
pub const CAT_PROBE: &str = r#"if [ "$1" = "-version" ]; then echo "ffprobe version stub"; exit 0; fi
for last; do :; done
cat "$last""#;

#[cfg(unix)]
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("write script");
    let mut perms = std::fs::metadata(&path).expect("script metadata").permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).expect("chmod script");
    path
}

pub fn write_file(root: &Path, relative: &str, contents: &str) -> PathBuf {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("create parent");
    }
    std::fs::write(&path, contents).expect("write file");
    path
}

/// Reads the height straight out of the file: `"1080"` probes as 1080, an
/// empty file has no video stream, anything else fails.
#[derive(Debug, Default)]
pub struct ContentProber;

#[async_trait]
impl Prober for ContentProber {
    fn name(&self) -> &'static str {
        "content"
    }

    async fn preflight(&self) -> Result<()> {
        Ok(())
    }

    async fn probe(&self, path: &Path) -> Result<u32> {
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|err| SortError::ProcessError {
                path: path.to_path_buf(),
                detail: err.to_string(),
            })?;
        let text = text.trim();
        if text.is_empty() {
            return Err(SortError::NoVideoStream(path.to_path_buf()));
        }
        text.parse().map_err(|_| SortError::ProcessError {
            path: path.to_path_buf(),
            detail: format!("unexpected output {text:?}"),
        })
    }
}
