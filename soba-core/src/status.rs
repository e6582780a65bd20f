//! The daemon status record.
//!
//! A small process-wide document at `<state_dir>/status.json`, rewritten
//! after each tick's relevant event and read by `soba status`. Writes are
//! whole-file replacements via temp file + rename so a concurrent reader
//! always sees a complete document.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatusRecord {
    pub pid: u32,
    /// `tmux` or `direct`.
    pub mode: String,
    /// Issue currently occupying the active slot, if any.
    pub current_issue: Option<u64>,
    /// Its workflow label after the most recent transition.
    pub current_phase_label: Option<String>,
    /// RFC 3339 timestamp of the last completed processing.
    pub last_completed: Option<String>,
    /// Resident set size in kilobytes, when readable.
    pub memory_kb: Option<u64>,
    /// RFC 3339 timestamp of this write.
    pub updated_at: String,
}

/// Writes the status record atomically.
#[derive(Debug, Clone)]
pub struct StatusWriter {
    path: PathBuf,
}

impl StatusWriter {
    pub fn new(state_dir: &Path) -> Self {
        Self {
            path: state_dir.join("status.json"),
        }
    }

    pub fn write(&self, record: &StatusRecord) -> Result<()> {
        let content = serde_json::to_string_pretty(record)?;
        atomic_write(&self.path, &content)
    }
}

/// Read the status record, if one exists.
pub fn read_status(state_dir: &Path) -> Result<Option<StatusRecord>> {
    let path = state_dir.join("status.json");
    match fs::read_to_string(&path) {
        Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Write `content` to `path` atomically using a temp file + rename.
///
/// `rename(2)` within one directory is atomic on POSIX, so readers see
/// either the old complete file or the new complete file, never a partial
/// write.
pub fn atomic_write(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("tmp");
    let mut f = fs::File::create(&tmp)?;
    f.write_all(content.as_bytes())?;
    f.sync_all()?;
    fs::rename(&tmp, path)?;
    Ok(())
}

/// Resident set size of this process in kilobytes, from `/proc/self/status`.
/// None on platforms without procfs.
pub fn memory_usage_kb() -> Option<u64> {
    let status = fs::read_to_string("/proc/self/status").ok()?;
    let line = status.lines().find(|l| l.starts_with("VmRSS:"))?;
    line.split_whitespace().nth(1)?.parse().ok()
}
