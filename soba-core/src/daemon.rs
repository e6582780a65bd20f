//! Daemon process primitives: PID file, stop sentinel, shutdown flag.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{Error, Result};
use crate::status::atomic_write;

static SHUTDOWN: AtomicBool = AtomicBool::new(false);

/// Ask the control loop to stop after the in-flight tick. Safe to call from
/// a signal handler (single atomic store).
pub fn request_shutdown() {
    SHUTDOWN.store(true, Ordering::SeqCst);
}

pub fn shutdown_requested() -> bool {
    SHUTDOWN.load(Ordering::SeqCst)
}

/// The daemon PID file at `<state_dir>/soba.pid`.
///
/// Its presence blocks a second daemon starting from the same state
/// directory. A PID file whose process is no longer alive is stale and
/// overwritten. The guard removes the file on drop.
pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    pub fn path_in(state_dir: &Path) -> PathBuf {
        state_dir.join("soba.pid")
    }

    /// Write the current PID, refusing if a live daemon already owns it.
    pub fn acquire(state_dir: &Path) -> Result<Self> {
        let path = Self::path_in(state_dir);
        if let Some(pid) = read_pid(state_dir) {
            if is_pid_alive(pid) {
                return Err(Error::Config(format!(
                    "daemon already running (PID {pid}); stop it first or remove {}",
                    path.display()
                )));
            }
        }
        atomic_write(&path, &format!("{}\n", std::process::id()))?;
        Ok(Self { path })
    }
}

impl Drop for PidFile {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

/// Read the recorded daemon PID, if any.
pub fn read_pid(state_dir: &Path) -> Option<u32> {
    let contents = fs::read_to_string(PidFile::path_in(state_dir)).ok()?;
    contents.trim().parse().ok()
}

/// Returns true if the process with `pid` is currently running.
///
/// Sends signal 0 via `kill -0`: this checks process existence without
/// delivering an actual signal and works on all Unix systems.
pub fn is_pid_alive(pid: u32) -> bool {
    std::process::Command::new("kill")
        .args(["-0", &pid.to_string()])
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// Graceful-stop sentinel: an empty file at `<state_dir>/stopping`.
///
/// A sibling `soba stop` invocation creates it; the control loop honors it
/// at the top of each tick and the daemon removes it on exit.
pub struct StoppingSentinel(PathBuf);

impl StoppingSentinel {
    pub fn new(state_dir: &Path) -> Self {
        Self(state_dir.join("stopping"))
    }

    pub fn is_set(&self) -> bool {
        self.0.exists()
    }

    pub fn set(&self) -> Result<()> {
        if let Some(parent) = self.0.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.0, "")?;
        Ok(())
    }

    pub fn clear(&self) -> Result<()> {
        if self.0.exists() {
            fs::remove_file(&self.0)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn sentinel_not_set_by_default() {
        let dir = TempDir::new().unwrap();
        assert!(!StoppingSentinel::new(dir.path()).is_set());
    }

    #[test]
    fn sentinel_set_and_clear() {
        let dir = TempDir::new().unwrap();
        let sentinel = StoppingSentinel::new(dir.path());
        sentinel.set().unwrap();
        assert!(sentinel.is_set());
        sentinel.clear().unwrap();
        assert!(!sentinel.is_set());
    }

    #[test]
    fn sentinel_clear_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let sentinel = StoppingSentinel::new(dir.path());
        sentinel.clear().unwrap();
        assert!(!sentinel.is_set());
    }

    #[test]
    fn pid_file_written_and_removed() {
        let dir = TempDir::new().unwrap();
        {
            let _pid = PidFile::acquire(dir.path()).unwrap();
            assert_eq!(read_pid(dir.path()), Some(std::process::id()));
        }
        assert_eq!(read_pid(dir.path()), None);
    }

    #[test]
    fn live_pid_blocks_second_acquire() {
        let dir = TempDir::new().unwrap();
        let _pid = PidFile::acquire(dir.path()).unwrap();
        // Our own PID is alive, so a second acquire must refuse.
        assert!(PidFile::acquire(dir.path()).is_err());
    }

    #[test]
    fn stale_pid_overwritten() {
        let dir = TempDir::new().unwrap();
        // PID 0 is never a live user process from kill -0's perspective here;
        // use an implausibly large PID instead.
        fs::write(dir.path().join("soba.pid"), "4194304999\n").unwrap();
        let _pid = PidFile::acquire(dir.path()).unwrap();
        assert_eq!(read_pid(dir.path()), Some(std::process::id()));
    }

    #[test]
    fn current_process_is_alive() {
        assert!(is_pid_alive(std::process::id()));
    }
}
