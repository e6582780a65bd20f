//! GitHub port and adapters.
//!
//! [`GithubGateway`] is the seam the workflow services depend on; tests
//! inject recording fakes, production wires [`rest::RestGateway`].

pub mod auth;
pub mod rest;
mod retry;
pub mod types;

use std::sync::OnceLock;

use regex::Regex;

use crate::error::Result;
pub use types::{Issue, IssueState, LabelEntry, MergeResult, PullRequest, RepoLabel};

/// Port for all GitHub operations the workflow consumes.
///
/// Every operation is idempotent except `merge_pr`.
pub trait GithubGateway {
    /// All open issues with full label lists. PRs are excluded even though
    /// GitHub's issues endpoint returns them.
    fn list_open_issues(&self, repo: &str) -> Result<Vec<Issue>>;

    /// Closed issues, used by the window cleaner.
    fn list_closed_issues(&self, repo: &str) -> Result<Vec<Issue>>;

    fn list_labels(&self, repo: &str) -> Result<Vec<RepoLabel>>;

    /// Create a repository label. "Already exists" is success; the call is
    /// never retried.
    fn create_label(&self, repo: &str, name: &str, color: &str, description: &str) -> Result<()>;

    /// Unconditional label replace: `(current − remove) ∪ add`. Used only
    /// by bootstrap and the one-shot developer path; the control loop goes
    /// through [`GithubGateway::update_labels_with_check`].
    fn update_labels(&self, repo: &str, issue: u64, remove: &[&str], add: &[&str]) -> Result<()>;

    /// The label CAS primitive: reads current labels, returns false without
    /// writing when `from` is absent or `to` is already present, otherwise
    /// writes `(current − {from}) ∪ {to}` and returns true.
    ///
    /// GitHub has no server-side compare-and-swap, so two racing daemons can
    /// both observe the precondition and both write. That is tolerated: the
    /// writes are idempotent to the same target, and the tick-level anomaly
    /// guard catches whatever slips through.
    fn update_labels_with_check(&self, repo: &str, issue: u64, from: &str, to: &str)
        -> Result<bool>;

    /// Open PRs carrying every one of `labels` (server-side filter).
    fn search_prs_with_labels(&self, repo: &str, labels: &[&str]) -> Result<Vec<PullRequest>>;

    fn get_pr(&self, repo: &str, number: u64) -> Result<PullRequest>;

    /// Squash-merge. Fails with [`crate::error::Error::NotMergeable`] when
    /// GitHub reports the PR cannot be merged.
    fn merge_pr(&self, repo: &str, number: u64) -> Result<MergeResult>;

    /// Close the issue, then add `label`. Two calls, not atomic: a crash
    /// between them leaves a closed, unlabeled issue for the operator.
    fn close_issue_with_label(&self, repo: &str, number: u64, label: &str) -> Result<()>;
}

/// Extract the issue number a PR body links to via
/// `(fixes|closes|resolves) #<n>`, case-insensitive. First match wins.
pub fn pr_linked_issue(body: &str) -> Option<u64> {
    static LINK: OnceLock<Regex> = OnceLock::new();
    let re = LINK.get_or_init(|| {
        Regex::new(r"(?i)\b(?:fixes|closes|resolves)\s+#(\d+)").expect("link regex")
    });
    re.captures(body)?.get(1)?.as_str().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linked_issue_basic() {
        assert_eq!(pr_linked_issue("Fixes #12"), Some(12));
        assert_eq!(pr_linked_issue("closes #7 and more"), Some(7));
        assert_eq!(pr_linked_issue("RESOLVES #123"), Some(123));
    }

    #[test]
    fn linked_issue_inside_body() {
        let body = "## Summary\n\nImplements the widget.\n\nfixes #42\n";
        assert_eq!(pr_linked_issue(body), Some(42));
    }

    #[test]
    fn no_link_returns_none() {
        assert_eq!(pr_linked_issue(""), None);
        assert_eq!(pr_linked_issue("relates to #12"), None);
        assert_eq!(pr_linked_issue("fixes 12"), None);
    }

    #[test]
    fn first_link_wins() {
        assert_eq!(pr_linked_issue("fixes #3, closes #4"), Some(3));
    }

    #[test]
    fn prefix_words_do_not_match() {
        // "prefixes #9" must not count as "fixes #9".
        assert_eq!(pr_linked_issue("prefixes #9"), None);
    }
}
