//! The phase state machine.
//!
//! Pure functions over label sets; no I/O. The workflow advances an issue
//! through label transitions:
//!
//! ```text
//!   todo ──queue──▶ queued ──▶ planning ──agent──▶ ready ──▶ doing
//!     ──agent──▶ review-requested ──▶ reviewing ──agent──▶ done ──▶ merged
//!                                        │
//!                                        └──▶ requires-changes ──▶ revising
//!                                                 (agent loops back to review-requested)
//! ```
//!
//! Labels in [`crate::labels::IN_PROGRESS`] mean the external agent owns the
//! issue right now; [`determine_phase`] returns None for those and the
//! orchestrator must not act.

use crate::labels;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Backlog promotion (`todo → queued`). Driven by the queueing service
    /// only; the tick's processable list excludes it.
    Plan,
    /// Start planning (`queued → planning`).
    QueuedToPlanning,
    /// Start implementation (`ready → doing`).
    Implement,
    /// Start review (`review-requested → reviewing`).
    Review,
    /// Start revision (`requires-changes → revising`).
    Revise,
}

impl Phase {
    /// The label transition this phase performs.
    pub fn edge(self) -> (&'static str, &'static str) {
        match self {
            Phase::Plan => (labels::TODO, labels::QUEUED),
            Phase::QueuedToPlanning => (labels::QUEUED, labels::PLANNING),
            Phase::Implement => (labels::READY, labels::DOING),
            Phase::Review => (labels::REVIEW_REQUESTED, labels::REVIEWING),
            Phase::Revise => (labels::REQUIRES_CHANGES, labels::REVISING),
        }
    }

    /// Which `phase.<key>` config entry supplies the command.
    ///
    /// `QueuedToPlanning` launches the plan command: `todo → queued` is
    /// label-only promotion, so planning work starts on the queued edge.
    pub fn command_key(self) -> &'static str {
        match self {
            Phase::Plan | Phase::QueuedToPlanning => "plan",
            Phase::Implement => "implement",
            Phase::Review => "review",
            Phase::Revise => "revise",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Plan => "plan",
            Phase::QueuedToPlanning => "queued_to_planning",
            Phase::Implement => "implement",
            Phase::Review => "review",
            Phase::Revise => "revise",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decide what the orchestrator should do with an issue in this label
/// state. None means hands off: either the agent is mid-phase or the issue
/// carries no workflow label we act on.
pub fn determine_phase(issue_labels: &[String]) -> Option<Phase> {
    if labels::contains_any(issue_labels, &labels::IN_PROGRESS) {
        return None;
    }
    let has = |l: &str| issue_labels.iter().any(|x| x == l);
    if has(labels::TODO) {
        Some(Phase::Plan)
    } else if has(labels::QUEUED) {
        Some(Phase::QueuedToPlanning)
    } else if has(labels::READY) {
        Some(Phase::Implement)
    } else if has(labels::REVIEW_REQUESTED) {
        Some(Phase::Review)
    } else if has(labels::REQUIRES_CHANGES) {
        Some(Phase::Revise)
    } else {
        None
    }
}

/// The legal transition table: orchestrator edges, agent edges, the
/// auto-merge edge, and the legacy one-shot `todo → planning` edge.
pub fn validate_transition(from: &str, to: &str) -> bool {
    matches!(
        (from, to),
        // Orchestrator-driven.
        (labels::TODO, labels::QUEUED)
            | (labels::QUEUED, labels::PLANNING)
            | (labels::READY, labels::DOING)
            | (labels::REVIEW_REQUESTED, labels::REVIEWING)
            | (labels::REQUIRES_CHANGES, labels::REVISING)
            // Agent-driven.
            | (labels::PLANNING, labels::READY)
            | (labels::DOING, labels::REVIEW_REQUESTED)
            | (labels::REVIEWING, labels::REQUIRES_CHANGES)
            | (labels::REVIEWING, labels::DONE)
            | (labels::REVISING, labels::REVIEW_REQUESTED)
            // Auto-merger, after the PR lands.
            | (labels::DONE, labels::MERGED)
            // Legacy one-shot developer path.
            | (labels::TODO, labels::PLANNING)
    )
}
