//! Auto-merge sweep for approved pull requests.
//!
//! PRs labeled `lgtm` are squash-merged; the linked issue (via the
//! `fixes #n` body reference) is closed and tagged `merged`.

use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::github::{pr_linked_issue, GithubGateway, PullRequest};
use crate::labels;
use crate::slack::SlackNotifier;

/// Outcome of one sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeReport {
    pub merged: Vec<u64>,
    pub failed: Vec<(u64, String)>,
}

impl MergeReport {
    pub fn is_empty(&self) -> bool {
        self.merged.is_empty() && self.failed.is_empty()
    }
}

/// Pure function: why this PR cannot be merged right now, if it cannot.
///
/// `mergeable == None` (GitHub still computing) is treated as not yet
/// mergeable; the PR is retried on a later sweep.
pub fn merge_blocker(pr: &PullRequest) -> Option<String> {
    if pr.mergeable == Some(false) {
        return Some("github reports not mergeable".into());
    }
    if pr.mergeable.is_none() {
        return Some("mergeability not yet computed".into());
    }
    match pr.mergeable_state.as_deref() {
        Some("dirty") => Some("merge state dirty".into()),
        Some("blocked") => Some("merge state blocked".into()),
        _ => None,
    }
}

pub struct AutoMerger<'a, G: GithubGateway> {
    gateway: &'a G,
    slack: &'a SlackNotifier,
}

impl<'a, G: GithubGateway> AutoMerger<'a, G> {
    pub fn new(gateway: &'a G, slack: &'a SlackNotifier) -> Self {
        Self { gateway, slack }
    }

    /// Merge every approved PR, closing linked issues. Per-PR failures are
    /// aggregated in the report; only rate limiting aborts the sweep.
    pub fn run(&self, repo: &str) -> Result<MergeReport> {
        let candidates = self.gateway.search_prs_with_labels(repo, &[labels::LGTM])?;
        let mut report = MergeReport::default();

        for candidate in candidates {
            let number = candidate.number;
            let pr = self.gateway.get_pr(repo, number)?;

            if let Some(reason) = merge_blocker(&pr) {
                info!(pr = number, reason = %reason, "skipping approved PR");
                report.failed.push((number, reason));
                continue;
            }

            match self.gateway.merge_pr(repo, number) {
                Ok(result) => {
                    info!(pr = number, sha = ?result.sha, "merged");
                    let linked = pr_linked_issue(&pr.body);
                    if let Some(issue) = linked {
                        if let Err(e) =
                            self.gateway
                                .close_issue_with_label(repo, issue, labels::MERGED)
                        {
                            // Best-effort: the merge already happened; the
                            // operator resolves a half-finished close.
                            warn!(pr = number, issue, error = %e, "close after merge failed");
                        }
                    }
                    self.slack.notify_merged(repo, number, linked);
                    report.merged.push(number);
                }
                Err(Error::NotMergeable { reason, .. }) => {
                    report.failed.push((number, reason));
                }
                Err(e @ Error::RateLimited { .. }) => return Err(e),
                Err(e) => {
                    warn!(pr = number, error = %e, "merge attempt failed");
                    report.failed.push((number, e.to_string()));
                }
            }
        }

        Ok(report)
    }
}
