//! Backlog promotion: moves one `todo` issue into the `queued` slot.
//!
//! `queued` is a deliberate intermediate: a crash between promotion and
//! phase start leaves a visible marker the operator (and the next tick) can
//! resume from. The `queued → planning` transition happens on a later tick
//! in the issue processor, never here.

use tracing::info;

use super::blocking;
use crate::github::{GithubGateway, Issue};
use crate::labels;

/// Promote the lowest-numbered `todo` issue into `queued` via CAS.
///
/// Returns None when the slot is occupied (per the pre-promotion snapshot
/// in `issues`), when there is no candidate, or when the CAS loses a race.
pub fn queue_next_issue<G: GithubGateway>(
    gateway: &G,
    repo: &str,
    issues: &[Issue],
) -> crate::error::Result<Option<Issue>> {
    if blocking::is_blocked(issues) {
        return Ok(None);
    }

    let Some(candidate) = issues
        .iter()
        .filter(|i| i.has_label(labels::TODO))
        .min_by_key(|i| i.number)
    else {
        return Ok(None);
    };

    let swapped =
        gateway.update_labels_with_check(repo, candidate.number, labels::TODO, labels::QUEUED)?;
    if !swapped {
        // Another writer changed the label between fetch and CAS.
        return Ok(None);
    }

    info!(issue = candidate.number, "queued issue from backlog");
    Ok(Some(candidate.clone()))
}
