//! The workflow label vocabulary.
//!
//! Labels are the orchestrator's sole state store: exactly one of the
//! workflow labels is present on any issue the daemon touches, and every
//! transition swaps one for another. PRs additionally carry [`LGTM`] to
//! request auto-merge.

pub const TODO: &str = "todo";
pub const QUEUED: &str = "queued";
pub const PLANNING: &str = "planning";
pub const READY: &str = "ready";
pub const DOING: &str = "doing";
pub const REVIEW_REQUESTED: &str = "review-requested";
pub const REVIEWING: &str = "reviewing";
pub const REQUIRES_CHANGES: &str = "requires-changes";
pub const REVISING: &str = "revising";
pub const DONE: &str = "done";
pub const MERGED: &str = "merged";
pub const LGTM: &str = "lgtm";

/// Labels meaning "the external agent is working right now; do not act".
pub const IN_PROGRESS: [&str; 4] = [PLANNING, DOING, REVIEWING, REVISING];

/// Labels counting toward the single-active invariant.
pub const ACTIVE: [&str; 5] = [QUEUED, PLANNING, DOING, REVIEWING, REVISING];

/// Labels that block promoting a new issue out of the backlog. The outbox
/// states are included: the agent is done but the orchestrator has not yet
/// picked the issue up, so the slot is still occupied.
pub const BLOCKING: [&str; 7] = [
    QUEUED,
    PLANNING,
    DOING,
    REVIEWING,
    REVISING,
    REVIEW_REQUESTED,
    REQUIRES_CHANGES,
];

/// A label as created on the repository during `soba init`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LabelDef {
    pub name: &'static str,
    pub color: &'static str,
    pub description: &'static str,
}

/// Every label `soba init` creates, in creation order. Colors are cosmetic.
pub const DEFINITIONS: [LabelDef; 12] = [
    LabelDef {
        name: TODO,
        color: "e4e669",
        description: "Waiting in the backlog",
    },
    LabelDef {
        name: QUEUED,
        color: "fbca04",
        description: "Promoted out of the backlog, planning starts next tick",
    },
    LabelDef {
        name: PLANNING,
        color: "1d76db",
        description: "Agent is drafting an implementation plan",
    },
    LabelDef {
        name: READY,
        color: "0e8a16",
        description: "Plan approved, waiting for implementation",
    },
    LabelDef {
        name: DOING,
        color: "1d76db",
        description: "Agent is implementing",
    },
    LabelDef {
        name: REVIEW_REQUESTED,
        color: "d4c5f9",
        description: "Implementation finished, waiting for review",
    },
    LabelDef {
        name: REVIEWING,
        color: "1d76db",
        description: "Agent is reviewing",
    },
    LabelDef {
        name: REQUIRES_CHANGES,
        color: "e99695",
        description: "Review found problems, waiting for revision",
    },
    LabelDef {
        name: REVISING,
        color: "1d76db",
        description: "Agent is revising",
    },
    LabelDef {
        name: DONE,
        color: "0e8a16",
        description: "Review passed, waiting for merge",
    },
    LabelDef {
        name: MERGED,
        color: "6f42c1",
        description: "Pull request merged, issue closed",
    },
    LabelDef {
        name: LGTM,
        color: "0e8a16",
        description: "Pull request approved for auto-merge",
    },
];

/// True if any of `labels` appears in `set`.
pub fn contains_any(labels: &[String], set: &[&str]) -> bool {
    labels.iter().any(|l| set.contains(&l.as_str()))
}
