//! Thin wrapper over the tmux CLI.
//!
//! tmux's actual API is its command line, so this boundary shells out and
//! parses stdout. Failures map to `false`/`None`/empty; the only error that
//! escapes is a missing tmux binary, detected up front. Production uses
//! [`TmuxClient`]; tests substitute an in-memory fake of [`Multiplexer`].

use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::Duration;

use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowInfo {
    /// tmux window id, e.g. `@3`.
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaneInfo {
    /// tmux pane id, e.g. `%5`.
    pub id: String,
    /// Pane creation time, epoch seconds.
    pub start_time: u64,
}

/// Port over the terminal multiplexer.
pub trait Multiplexer {
    fn has_session(&self, name: &str) -> bool;
    fn new_session(&self, name: &str) -> bool;
    fn kill_session(&self, name: &str) -> bool;
    fn list_sessions(&self) -> Vec<String>;

    /// Create a window in `session`, returning its window id.
    fn new_window(&self, session: &str, name: &str) -> Option<String>;
    fn list_windows(&self, session: &str) -> Vec<WindowInfo>;
    fn kill_window(&self, window_id: &str) -> bool;

    fn list_panes(&self, window_id: &str) -> Vec<PaneInfo>;
    /// Split `window_id`, returning the new pane id.
    fn split_window(&self, window_id: &str, vertical: bool) -> Option<String>;
    fn kill_pane(&self, pane_id: &str) -> bool;
    fn select_layout(&self, window_id: &str, layout: &str) -> bool;

    /// Type `text` into the target pane and press Enter.
    fn send_keys(&self, target: &str, text: &str) -> bool;
    /// One-shot capture of the target pane's visible contents.
    fn capture_pane(&self, target: &str) -> Option<String>;

    /// Follow a pane: capture on an interval, feeding newly appended output
    /// to `on_chunk` until it returns false or the pane disappears.
    fn capture_pane_stream(
        &self,
        target: &str,
        interval: Duration,
        on_chunk: &mut dyn FnMut(&str) -> bool,
    ) {
        let mut seen = String::new();
        loop {
            let Some(current) = self.capture_pane(target) else {
                return;
            };
            let fresh = current.strip_prefix(seen.as_str()).unwrap_or(&current);
            if !fresh.is_empty() && !on_chunk(fresh) {
                return;
            }
            seen = current;
            std::thread::sleep(interval);
        }
    }
}

/// Returns true when the tmux binary is on PATH.
pub fn tmux_installed() -> bool {
    which::which("tmux").is_ok()
}

/// The real tmux, via subprocess.
pub struct TmuxClient {
    bin: PathBuf,
}

impl TmuxClient {
    /// Detect tmux on PATH. None means the daemon runs in direct mode.
    pub fn detect() -> Option<Self> {
        which::which("tmux").ok().map(|bin| Self { bin })
    }

    /// Run tmux with `args`, returning stdout on success.
    fn run(&self, args: &[&str]) -> Option<String> {
        let out = Command::new(&self.bin)
            .args(args)
            .stderr(Stdio::null())
            .output()
            .ok()?;
        if !out.status.success() {
            debug!(args = ?args, code = ?out.status.code(), "tmux command failed");
            return None;
        }
        Some(String::from_utf8_lossy(&out.stdout).trim_end().to_string())
    }

    fn run_ok(&self, args: &[&str]) -> bool {
        self.run(args).is_some()
    }

    /// Attach to a session, or switch the current client when already
    /// inside tmux. Used by `soba open` only, never by the daemon.
    pub fn attach_session(&self, session: &str) -> bool {
        let inside_tmux = std::env::var("TMUX").is_ok_and(|v| !v.is_empty());
        let status = if inside_tmux {
            Command::new(&self.bin)
                .args(["switch-client", "-t", session])
                .status()
        } else {
            Command::new(&self.bin)
                .args(["attach-session", "-t", session])
                .status()
        };
        status.map(|s| s.success()).unwrap_or(false)
    }

    /// Attach with a specific window selected.
    pub fn attach_window(&self, session: &str, window_id: &str) -> bool {
        let _ = self.run(&["select-window", "-t", window_id]);
        self.attach_session(session)
    }
}

impl Multiplexer for TmuxClient {
    fn has_session(&self, name: &str) -> bool {
        self.run_ok(&["has-session", "-t", name])
    }

    fn new_session(&self, name: &str) -> bool {
        self.run_ok(&["new-session", "-d", "-s", name])
    }

    fn kill_session(&self, name: &str) -> bool {
        self.run_ok(&["kill-session", "-t", name])
    }

    fn list_sessions(&self) -> Vec<String> {
        self.run(&["list-sessions", "-F", "#{session_name}"])
            .map(|out| out.lines().map(str::to_string).collect())
            .unwrap_or_default()
    }

    fn new_window(&self, session: &str, name: &str) -> Option<String> {
        self.run(&[
            "new-window",
            "-d",
            "-P",
            "-F",
            "#{window_id}",
            "-t",
            session,
            "-n",
            name,
        ])
    }

    fn list_windows(&self, session: &str) -> Vec<WindowInfo> {
        self.run(&[
            "list-windows",
            "-t",
            session,
            "-F",
            "#{window_id} #{window_name}",
        ])
        .map(|out| {
            out.lines()
                .filter_map(|line| {
                    let (id, name) = line.split_once(' ')?;
                    Some(WindowInfo {
                        id: id.to_string(),
                        name: name.to_string(),
                    })
                })
                .collect()
        })
        .unwrap_or_default()
    }

    fn kill_window(&self, window_id: &str) -> bool {
        self.run_ok(&["kill-window", "-t", window_id])
    }

    fn list_panes(&self, window_id: &str) -> Vec<PaneInfo> {
        self.run(&[
            "list-panes",
            "-t",
            window_id,
            "-F",
            "#{pane_id} #{pane_start_time}",
        ])
        .map(|out| {
            out.lines()
                .filter_map(|line| {
                    let (id, start) = line.split_once(' ')?;
                    Some(PaneInfo {
                        id: id.to_string(),
                        start_time: start.trim().parse().ok()?,
                    })
                })
                .collect()
        })
        .unwrap_or_default()
    }

    fn split_window(&self, window_id: &str, vertical: bool) -> Option<String> {
        let direction = if vertical { "-v" } else { "-h" };
        self.run(&[
            "split-window",
            direction,
            "-d",
            "-P",
            "-F",
            "#{pane_id}",
            "-t",
            window_id,
        ])
    }

    fn kill_pane(&self, pane_id: &str) -> bool {
        self.run_ok(&["kill-pane", "-t", pane_id])
    }

    fn select_layout(&self, window_id: &str, layout: &str) -> bool {
        self.run_ok(&["select-layout", "-t", window_id, layout])
    }

    fn send_keys(&self, target: &str, text: &str) -> bool {
        self.run_ok(&["send-keys", "-t", target, text, "C-m"])
    }

    fn capture_pane(&self, target: &str) -> Option<String> {
        self.run(&["capture-pane", "-p", "-t", target])
    }
}
