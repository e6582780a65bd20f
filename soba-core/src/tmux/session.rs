//! Session, window and pane management for phase executions.
//!
//! One session per repository (`soba-<slug>`), one window per issue
//! (`issue-<n>`), one pane per phase invocation. Windows are capped at
//! `max_panes` panes; the oldest pane (by start time) is evicted first.

use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use tracing::{debug, info};

use super::client::Multiplexer;
use crate::error::{Error, Result};
use crate::lock::{self, LockDir};

/// Prefix shared by every session this daemon owns.
pub const SESSION_PREFIX: &str = "soba-";

const LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// Repository slug for session names: `/`, `.` and `_` all become `-`.
pub fn session_slug(repo: &str) -> String {
    repo.replace(['/', '.', '_'], "-")
}

pub fn session_name(repo: &str) -> String {
    format!("{SESSION_PREFIX}{}", session_slug(repo))
}

/// Window name for an issue.
pub fn window_name(issue: u64) -> String {
    format!("issue-{issue}")
}

/// Parse an `issue-<n>` window name. Exact form only, no substring match.
pub fn parse_issue_window(name: &str) -> Option<u64> {
    static WINDOW: OnceLock<Regex> = OnceLock::new();
    let re = WINDOW.get_or_init(|| Regex::new(r"^issue-(\d+)$").expect("window regex"));
    re.captures(name)?.get(1)?.as_str().parse().ok()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRef {
    pub name: String,
    pub created: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowRef {
    pub id: String,
    pub name: String,
    pub created: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssueWindow {
    pub issue_number: u64,
    pub window_id: String,
}

pub struct SessionManager<M: Multiplexer> {
    mux: M,
    locks: LockDir,
    max_panes: usize,
}

impl<M: Multiplexer> SessionManager<M> {
    pub fn new(mux: M, locks: LockDir, max_panes: usize) -> Self {
        Self {
            mux,
            locks,
            max_panes,
        }
    }

    pub fn mux(&self) -> &M {
        &self.mux
    }

    /// Find the repository session, creating it if absent. Idempotent.
    ///
    /// Lookup tries the modern name first, then the legacy `-<pid>` variant
    /// left behind by daemons that embedded their PID in the session name.
    pub fn find_or_create_session(&self, repo: &str) -> Result<SessionRef> {
        let name = session_name(repo);
        if self.mux.has_session(&name) {
            return Ok(SessionRef {
                name,
                created: false,
            });
        }
        let legacy = format!("{name}-{}", std::process::id());
        if self.mux.has_session(&legacy) {
            return Ok(SessionRef {
                name: legacy,
                created: false,
            });
        }
        if !self.mux.new_session(&name) {
            return Err(Error::Unexpected(format!(
                "tmux could not create session {name}"
            )));
        }
        info!(session = %name, "created tmux session");
        Ok(SessionRef {
            name,
            created: true,
        })
    }

    /// Find the `issue-<n>` window in `session`, creating it if absent.
    pub fn find_or_create_issue_window(&self, session: &str, issue: u64) -> Result<WindowRef> {
        let name = window_name(issue);
        if let Some(id) = self.find_window_id(session, &name) {
            return Ok(WindowRef {
                id,
                name,
                created: false,
            });
        }
        let id = self.mux.new_window(session, &name).ok_or_else(|| {
            Error::Unexpected(format!("tmux could not create window {name} in {session}"))
        })?;
        debug!(session, window = %name, "created issue window");
        Ok(WindowRef {
            id,
            name,
            created: true,
        })
    }

    /// Create a pane for a phase execution, evicting the oldest panes while
    /// the window is at capacity.
    ///
    /// The evict-then-split sequence runs under a `(session, window)` file
    /// lock so a concurrent tick cannot race pane creation against
    /// eviction.
    pub fn create_phase_pane(
        &self,
        session: &str,
        window: &WindowRef,
        vertical: bool,
    ) -> Result<String> {
        let key = lock::window_key(session, &window.id);
        self.locks
            .with_lock(&key, LOCK_TIMEOUT, || {
                let mut panes = self.mux.list_panes(&window.id);
                panes.sort_by_key(|p| p.start_time);
                while panes.len() >= self.max_panes {
                    let oldest = panes.remove(0);
                    debug!(pane = %oldest.id, window = %window.name, "evicting oldest pane");
                    self.mux.kill_pane(&oldest.id);
                }
                let pane = self.mux.split_window(&window.id, vertical).ok_or_else(|| {
                    Error::Unexpected(format!("tmux could not split window {}", window.name))
                })?;
                self.mux.select_layout(&window.id, "even-horizontal");
                Ok(pane)
            })?
    }

    /// Every `issue-<n>` window in the session.
    pub fn list_issue_windows(&self, session: &str) -> Vec<IssueWindow> {
        self.mux
            .list_windows(session)
            .into_iter()
            .filter_map(|w| {
                parse_issue_window(&w.name).map(|issue_number| IssueWindow {
                    issue_number,
                    window_id: w.id,
                })
            })
            .collect()
    }

    pub fn find_issue_window(&self, session: &str, issue: u64) -> Option<String> {
        self.find_window_id(session, &window_name(issue))
    }

    fn find_window_id(&self, session: &str, name: &str) -> Option<String> {
        self.mux
            .list_windows(session)
            .into_iter()
            .find(|w| w.name == name)
            .map(|w| w.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tmux::client::testing::FakeMux;
    use tempfile::TempDir;

    fn manager(dir: &TempDir) -> SessionManager<FakeMux> {
        SessionManager::new(FakeMux::new(), LockDir::new(dir.path()), 3)
    }

    #[test]
    fn slug_replaces_separators() {
        assert_eq!(session_slug("acme/my_repo.rs"), "acme-my-repo-rs");
        assert_eq!(session_name("acme/widgets"), "soba-acme-widgets");
    }

    #[test]
    fn window_name_round_trips() {
        assert_eq!(parse_issue_window(&window_name(42)), Some(42));
    }

    #[test]
    fn window_regex_is_exact() {
        assert_eq!(parse_issue_window("issue-12"), Some(12));
        assert_eq!(parse_issue_window("issue-12-extra"), None);
        assert_eq!(parse_issue_window("my-issue-12"), None);
        assert_eq!(parse_issue_window("issue-"), None);
        assert_eq!(parse_issue_window("issue-abc"), None);
    }

    #[test]
    fn session_created_once() {
        let dir = TempDir::new().unwrap();
        let mgr = manager(&dir);
        let first = mgr.find_or_create_session("acme/widgets").unwrap();
        assert!(first.created);
        let second = mgr.find_or_create_session("acme/widgets").unwrap();
        assert!(!second.created);
        assert_eq!(first.name, second.name);
    }

    #[test]
    fn issue_window_created_once() {
        let dir = TempDir::new().unwrap();
        let mgr = manager(&dir);
        let session = mgr.find_or_create_session("acme/widgets").unwrap();
        let w1 = mgr.find_or_create_issue_window(&session.name, 7).unwrap();
        assert!(w1.created);
        assert_eq!(w1.name, "issue-7");
        let w2 = mgr.find_or_create_issue_window(&session.name, 7).unwrap();
        assert!(!w2.created);
        assert_eq!(w1.id, w2.id);
    }

    #[test]
    fn pane_cap_evicts_oldest_first() {
        let dir = TempDir::new().unwrap();
        let mgr = manager(&dir);
        let session = mgr.find_or_create_session("acme/widgets").unwrap();
        let window = mgr.find_or_create_issue_window(&session.name, 1).unwrap();

        // The window starts with one pane; seed two more with known times.
        let oldest = mgr.mux().add_pane(&window.id, 10);
        let _middle = mgr.mux().add_pane(&window.id, 20);
        assert_eq!(mgr.mux().pane_count(&window.id), 3);

        mgr.create_phase_pane(&session.name, &window, false).unwrap();

        let panes = mgr.mux().list_panes(&window.id);
        assert_eq!(panes.len(), 3);
        assert!(
            panes.iter().all(|p| p.id != oldest),
            "oldest pane must be the one evicted"
        );
    }

    #[test]
    fn pane_creation_applies_even_horizontal() {
        let dir = TempDir::new().unwrap();
        let mgr = manager(&dir);
        let session = mgr.find_or_create_session("acme/widgets").unwrap();
        let window = mgr.find_or_create_issue_window(&session.name, 1).unwrap();
        mgr.create_phase_pane(&session.name, &window, false).unwrap();
        let layouts = mgr.mux().layouts.borrow();
        assert_eq!(
            layouts.last().map(|(_, l)| l.as_str()),
            Some("even-horizontal")
        );
    }

    #[test]
    fn list_issue_windows_ignores_foreign_names() {
        let dir = TempDir::new().unwrap();
        let mgr = manager(&dir);
        let session = mgr.find_or_create_session("acme/widgets").unwrap();
        mgr.find_or_create_issue_window(&session.name, 3).unwrap();
        mgr.mux().new_window(&session.name, "scratch");
        mgr.mux().new_window(&session.name, "issue-4-wip");

        let windows = mgr.list_issue_windows(&session.name);
        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0].issue_number, 3);
    }

    #[test]
    fn find_issue_window_exact_match_only() {
        let dir = TempDir::new().unwrap();
        let mgr = manager(&dir);
        let session = mgr.find_or_create_session("acme/widgets").unwrap();
        mgr.mux().new_window(&session.name, "issue-40");
        assert!(mgr.find_issue_window(&session.name, 4).is_none());
        assert!(mgr.find_issue_window(&session.name, 40).is_some());
    }
}
