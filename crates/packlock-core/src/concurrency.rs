//! Advisory cross-process guard around lock file writes.

use fs2::FileExt;
use std::ffi::OsString;
use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Exclusive `flock` on a `<lock>.guard` sidecar, held until dropped.
///
/// Two `packlock lock` runs targeting the same file serialize on this guard
/// so neither persists a lock computed from a stale view.
pub struct WriteGuard {
    guard_file: File,
    path: PathBuf,
}

impl WriteGuard {
    /// Sidecar path guarding writes to `lock_path`.
    pub fn guard_path(lock_path: &Path) -> PathBuf {
        let mut name = lock_path
            .file_name()
            .map_or_else(|| OsString::from("governance-lock"), OsString::from);
        name.push(".guard");
        lock_path.with_file_name(name)
    }

    /// Block until the guard for `lock_path` is held.
    pub fn acquire(lock_path: &Path) -> io::Result<Self> {
        let path = Self::guard_path(lock_path);
        let file = open_guard(&path)?;
        file.lock_exclusive()?;
        debug!("acquired write guard {}", path.display());
        Ok(Self {
            guard_file: file,
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn open_guard(path: &Path) -> io::Result<File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(false)
        .open(path)
}

impl Drop for WriteGuard {
    fn drop(&mut self) {
        let _ = self.guard_file.unlock();
    }
}
