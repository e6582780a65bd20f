//! File-system locks for local critical sections.
//!
//! Two lock keys exist in the critical path: `(repo, issue)` serializes
//! re-entries of the issue processor, and `(session, window)` serializes
//! pane creation against eviction. Lock files live in `<state_dir>/locks/`,
//! hold the holder's PID, and are single-host only; there is no attempt to
//! coordinate across machines.
//!
//! A lock file older than the staleness threshold is treated as abandoned
//! (the holder crashed without dropping its guard) and overwritten.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tracing::warn;

use crate::error::{Error, Result};

pub const DEFAULT_STALENESS: Duration = Duration::from_secs(300);

const POLL: Duration = Duration::from_millis(100);

/// Lock key for one issue's processing pipeline.
pub fn issue_key(repo: &str, issue: u64) -> String {
    format!("issue-{}-{issue}", repo.replace('/', "-"))
}

/// Lock key for pane mutations inside one window.
pub fn window_key(session: &str, window: &str) -> String {
    format!("window-{session}-{}", window.replace(['@', ':'], ""))
}

/// A directory of PID-bearing lock files.
#[derive(Debug, Clone)]
pub struct LockDir {
    dir: PathBuf,
    staleness: Duration,
}

impl LockDir {
    pub fn new(state_dir: &Path) -> Self {
        Self {
            dir: state_dir.join("locks"),
            staleness: DEFAULT_STALENESS,
        }
    }

    #[cfg(test)]
    pub fn with_staleness(state_dir: &Path, staleness: Duration) -> Self {
        Self {
            dir: state_dir.join("locks"),
            staleness,
        }
    }

    /// Run `f` while holding the named lock. The guard is released on every
    /// exit path, including panics, because release happens in `Drop`.
    pub fn with_lock<T>(&self, key: &str, timeout: Duration, f: impl FnOnce() -> T) -> Result<T> {
        let _guard = self.acquire(key, timeout)?;
        Ok(f())
    }

    fn acquire(&self, key: &str, timeout: Duration) -> Result<LockGuard> {
        fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(format!("{key}.lock"));
        let deadline = SystemTime::now() + timeout;

        loop {
            match fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
            {
                Ok(file) => {
                    use std::io::Write;
                    let mut file = file;
                    let _ = writeln!(file, "{}", std::process::id());
                    return Ok(LockGuard { path });
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    if self.is_stale(&path) {
                        warn!(lock = key, "overwriting stale lock");
                        let _ = fs::remove_file(&path);
                        continue;
                    }
                    if SystemTime::now() >= deadline {
                        return Err(Error::LockTimeout(key.to_string()));
                    }
                    std::thread::sleep(POLL);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn is_stale(&self, path: &Path) -> bool {
        let age = fs::metadata(path)
            .and_then(|m| m.modified())
            .ok()
            .and_then(|mtime| SystemTime::now().duration_since(mtime).ok());
        matches!(age, Some(a) if a >= self.staleness)
    }
}

/// RAII guard removing the lock file on drop.
struct LockGuard {
    path: PathBuf,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn lock_released_after_closure() {
        let dir = TempDir::new().unwrap();
        let locks = LockDir::new(dir.path());
        locks
            .with_lock("issue-a-b-1", Duration::from_secs(1), || ())
            .unwrap();
        // Re-acquiring immediately must succeed.
        locks
            .with_lock("issue-a-b-1", Duration::from_millis(50), || ())
            .unwrap();
    }

    #[test]
    fn closure_result_returned() {
        let dir = TempDir::new().unwrap();
        let locks = LockDir::new(dir.path());
        let v = locks
            .with_lock("k", Duration::from_secs(1), || 42)
            .unwrap();
        assert_eq!(v, 42);
    }

    #[test]
    fn held_lock_times_out() {
        let dir = TempDir::new().unwrap();
        let locks = LockDir::new(dir.path());
        let _guard = locks.acquire("busy", Duration::from_secs(1)).unwrap();
        let err = locks
            .with_lock("busy", Duration::from_millis(150), || ())
            .unwrap_err();
        assert!(matches!(err, Error::LockTimeout(_)));
    }

    #[test]
    fn stale_lock_overwritten() {
        let dir = TempDir::new().unwrap();
        let locks = LockDir::with_staleness(dir.path(), Duration::from_millis(0));
        // Leak a lock file as if the holder had crashed.
        let lock_path = dir.path().join("locks").join("crashed.lock");
        fs::create_dir_all(lock_path.parent().unwrap()).unwrap();
        fs::write(&lock_path, "99999\n").unwrap();
        // Zero staleness threshold: any existing lock counts as abandoned.
        locks
            .with_lock("crashed", Duration::from_millis(200), || ())
            .unwrap();
    }

    #[test]
    fn lock_file_carries_pid() {
        let dir = TempDir::new().unwrap();
        let locks = LockDir::new(dir.path());
        let guard = locks.acquire("pidcheck", Duration::from_secs(1)).unwrap();
        let contents = fs::read_to_string(&guard.path).unwrap();
        assert_eq!(
            contents.trim().parse::<u32>().unwrap(),
            std::process::id()
        );
    }

    #[test]
    fn key_builders_are_path_safe() {
        assert_eq!(issue_key("acme/widgets", 7), "issue-acme-widgets-7");
        assert!(!window_key("soba-acme", "@3").contains('@'));
    }
}
