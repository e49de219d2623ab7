//! Advisory lock for the observation artifact.
//!
//! Lock strategy:
//! - Whoever touches the artifact creates `<artifact>.lock` first and removes
//!   it when its [`LockGuard`] drops, on every exit path.
//! - The compactor tries once and skips the check if the marker exists.
//! - The appender polls [`try_acquire`] on a fixed interval and gives up after
//!   a bounded number of retries. It holds the guard across the append.
//! - The marker's content names the holder for debugging only; it is never
//!   read back. There is no fencing; every holder runs on the same host.

use crate::config::LockConfig;
use crate::error::Result;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Held artifact lock; removes the marker on drop.
#[derive(Debug)]
pub struct LockGuard {
    path: PathBuf,
}

impl LockGuard {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            if e.kind() != io::ErrorKind::NotFound {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Failed to remove lock marker"
                );
            }
        }
    }
}

/// Create the lock marker, or return `None` if it already exists.
pub fn try_acquire(path: &Path, holder: &str) -> Result<Option<LockGuard>> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }

    let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    // Owner info for debugging.
    let _ = writeln!(
        file,
        "holder={} pid={} id={} at={}",
        holder,
        std::process::id(),
        uuid::Uuid::new_v4(),
        chrono::Utc::now().to_rfc3339()
    );

    tracing::debug!(path = %path.display(), holder, "Acquired artifact lock");
    Ok(Some(LockGuard {
        path: path.to_path_buf(),
    }))
}

/// Acquire the marker, retrying while someone else holds it.
///
/// Tries immediately, then once per retry interval, up to `max_retries`
/// more times. Returns `None` if the lock was still held at the end.
pub async fn acquire_with_retry(
    path: &Path,
    holder: &str,
    policy: &LockConfig,
) -> Result<Option<LockGuard>> {
    for attempt in 0..=policy.max_retries {
        if let Some(guard) = try_acquire(path, holder)? {
            return Ok(Some(guard));
        }
        if attempt == policy.max_retries {
            break;
        }
        tracing::debug!(
            path = %path.display(),
            attempt = attempt + 1,
            max_retries = policy.max_retries,
            "Artifact locked, waiting"
        );
        tokio::time::sleep(policy.retry_interval()).await;
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    fn policy(max_retries: u32) -> LockConfig {
        LockConfig {
            retry_interval_ms: 100,
            max_retries,
        }
    }

    #[test]
    fn test_acquire_and_release() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("obs.md.lock");

        let guard = try_acquire(&path, "compactor").unwrap().unwrap();
        assert!(path.exists());
        assert!(fs::read_to_string(&path).unwrap().starts_with("holder=compactor"));

        drop(guard);
        assert!(!path.exists());
    }

    #[test]
    fn test_second_acquire_fails_while_held() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("obs.md.lock");

        let _guard = try_acquire(&path, "first").unwrap().unwrap();
        assert!(try_acquire(&path, "second").unwrap().is_none());
    }

    #[test]
    fn test_acquire_creates_parent_directory() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".scribe/obs.md.lock");
        assert!(try_acquire(&path, "compactor").unwrap().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_acquires_immediately_when_free() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("obs.md.lock");
        let start = tokio::time::Instant::now();

        let guard = acquire_with_retry(&path, "appender", &policy(3)).await.unwrap();

        assert!(guard.is_some());
        assert!(path.exists());
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_gives_up_after_retries() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("obs.md.lock");
        let _guard = try_acquire(&path, "compactor").unwrap().unwrap();

        let start = tokio::time::Instant::now();
        let second = acquire_with_retry(&path, "appender", &policy(3)).await.unwrap();

        assert!(second.is_none());
        assert_eq!(start.elapsed(), Duration::from_millis(300));
        // the holder's marker is left alone
        assert!(fs::read_to_string(&path).unwrap().starts_with("holder=compactor"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_takes_over_when_released() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("obs.md.lock");
        let guard = try_acquire(&path, "compactor").unwrap().unwrap();

        let release = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(250)).await;
            drop(guard);
        });

        let guard = acquire_with_retry(&path, "appender", &policy(10))
            .await
            .unwrap()
            .unwrap();
        release.await.unwrap();
        assert!(fs::read_to_string(guard.path()).unwrap().starts_with("holder=appender"));
    }
}
