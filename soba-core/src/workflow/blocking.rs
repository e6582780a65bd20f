//! The queueing gate and the tick-level anomaly guard.
//!
//! Both are pure predicates over the issue list the tick fetched; the forge
//! is the single source of truth and nothing is cached across ticks.

use crate::github::Issue;
use crate::labels;

/// True iff starting a new workflow is blocked: some issue already occupies
/// the slot, counting the outbox states (`review-requested`,
/// `requires-changes`) whose pickup is pending.
pub fn is_blocked(issues: &[Issue]) -> bool {
    issues
        .iter()
        .any(|i| labels::contains_any(&i.labels, &labels::BLOCKING))
}

/// Issues counting toward the single-active invariant. More than one means
/// a cross-daemon race slipped past the CAS; the tick skips processing.
pub fn count_active(issues: &[Issue]) -> usize {
    issues
        .iter()
        .filter(|i| labels::contains_any(&i.labels, &labels::ACTIVE))
        .count()
}

#[cfg(test)]
pub(crate) fn issue(number: u64, issue_labels: &[&str]) -> Issue {
    use crate::github::IssueState;
    Issue {
        number,
        title: format!("Issue {number}"),
        state: IssueState::Open,
        labels: issue_labels.iter().map(|s| s.to_string()).collect(),
        created_at: None,
        updated_at: None,
    }
}
