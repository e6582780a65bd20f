//! Removes tmux windows whose issues have been closed.

use std::collections::HashSet;

use tracing::info;

use crate::error::Result;
use crate::github::GithubGateway;
use crate::tmux::{parse_issue_window, Multiplexer, SESSION_PREFIX};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanReport {
    /// `(session, issue)` for each killed window.
    pub killed: Vec<(String, u64)>,
}

pub struct ClosedWindowCleaner<'a, G: GithubGateway, M: Multiplexer> {
    gateway: &'a G,
    mux: &'a M,
}

impl<'a, G: GithubGateway, M: Multiplexer> ClosedWindowCleaner<'a, G, M> {
    pub fn new(gateway: &'a G, mux: &'a M) -> Self {
        Self { gateway, mux }
    }

    /// Sweep every soba session, killing `issue-<n>` windows whose issue is
    /// closed. Windows with foreign names, or whose issue is still open,
    /// are preserved.
    pub fn run(&self, repo: &str) -> Result<CleanReport> {
        let closed: HashSet<u64> = self
            .gateway
            .list_closed_issues(repo)?
            .into_iter()
            .map(|i| i.number)
            .collect();

        let mut report = CleanReport::default();
        for session in self
            .mux
            .list_sessions()
            .into_iter()
            .filter(|s| s.starts_with(SESSION_PREFIX))
        {
            for window in self.mux.list_windows(&session) {
                let Some(issue) = parse_issue_window(&window.name) else {
                    continue;
                };
                if closed.contains(&issue) && self.mux.kill_window(&window.id) {
                    info!(session = %session, issue, "removed window for closed issue");
                    report.killed.push((session.clone(), issue));
                }
            }
        }
        Ok(report)
    }
}
