//! Process-level lock so only one `scribe watch` drives a cursor directory.
//!
//! Lock strategy:
//! - `scribe-watch.lock.<hash>` in the runtime directory marks an active
//!   watcher for one cursor directory.
//! - The lock is an advisory OS file lock (flock), held for the process
//!   lifetime. A crashed watcher releases it automatically.
//! - One-shot commands (`render`, `status`, `compact`) never take it; the
//!   artifact lock already coordinates `compact` with a running watcher.

use anyhow::{Context, Result};
use std::collections::hash_map::DefaultHasher;
use std::fs::{self, File, OpenOptions};
use std::hash::{Hash, Hasher};
use std::io::{self, Seek, SeekFrom, Write};
use std::os::fd::AsRawFd;
use std::path::{Path, PathBuf};

const WATCH_LOCK_FILE: &str = "scribe-watch.lock";

/// Held by `scribe watch` for its whole lifetime.
pub struct WatchGuard {
    file: File,
    path: PathBuf,
}

impl Drop for WatchGuard {
    fn drop(&mut self) {
        let _ = unlock_file(&self.file);
        let _ = fs::remove_file(&self.path);
    }
}

/// Acquire the watcher lock for `cursor_dir`, failing if another watcher
/// holds it.
pub fn acquire_watch_guard(cursor_dir: &Path) -> Result<WatchGuard> {
    match try_acquire(&lock_dir(), cursor_dir)? {
        Some(guard) => Ok(guard),
        None => anyhow::bail!(
            "another scribe watch is already running for {}",
            cursor_dir.display()
        ),
    }
}

fn try_acquire(dir: &Path, cursor_dir: &Path) -> Result<Option<WatchGuard>> {
    fs::create_dir_all(dir)
        .with_context(|| format!("failed to create runtime lock directory: {}", dir.display()))?;

    let path = dir.join(scoped_lock_filename(cursor_dir));
    let mut file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(&path)
        .with_context(|| format!("failed to open lock file: {}", path.display()))?;

    match lock_file_nonblocking(&file) {
        Ok(()) => {
            // Owner info for debugging.
            let _ = file.set_len(0);
            let _ = file.seek(SeekFrom::Start(0));
            let _ = writeln!(file, "pid={}", std::process::id());
            let _ = file.flush();

            Ok(Some(WatchGuard { file, path }))
        }
        Err(e) if is_lock_busy(&e) => Ok(None),
        Err(e) => Err(e).with_context(|| format!("failed to lock file: {}", path.display())),
    }
}

fn lock_dir() -> PathBuf {
    let mut dir = match std::env::var_os("XDG_RUNTIME_DIR") {
        Some(path) if !path.is_empty() => PathBuf::from(path),
        _ => std::env::temp_dir(),
    };
    dir.push("scribe");
    dir
}

fn scoped_lock_filename(cursor_dir: &Path) -> String {
    let mut hasher = DefaultHasher::new();
    cursor_dir.to_string_lossy().hash(&mut hasher);
    format!("{}.{:016x}", WATCH_LOCK_FILE, hasher.finish())
}

fn is_lock_busy(error: &io::Error) -> bool {
    matches!(error.kind(), io::ErrorKind::WouldBlock)
        || matches!(error.raw_os_error(), Some(11) | Some(35))
}

#[cfg(unix)]
fn lock_file_nonblocking(file: &File) -> io::Result<()> {
    const LOCK_EX: i32 = 2;
    const LOCK_NB: i32 = 4;
    let fd = file.as_raw_fd();
    // SAFETY: flock is called with a valid file descriptor and constant flags.
    let rc = unsafe { flock(fd, LOCK_EX | LOCK_NB) };
    if rc == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

#[cfg(unix)]
fn unlock_file(file: &File) -> io::Result<()> {
    const LOCK_UN: i32 = 8;
    let fd = file.as_raw_fd();
    // SAFETY: flock is called with a valid file descriptor and constant flags.
    let rc = unsafe { flock(fd, LOCK_UN) };
    if rc == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

#[cfg(unix)]
extern "C" {
    fn flock(fd: i32, operation: i32) -> i32;
}

#[cfg(not(unix))]
compile_error!("scribe process locks currently require Unix (macOS/Linux)");
