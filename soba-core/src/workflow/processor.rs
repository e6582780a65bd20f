//! Per-issue processing: decide the phase, transition the label, launch the
//! phase command, publish side-effects.

use std::time::Duration;

use tracing::{info, warn};

use crate::clock::Clock;
use crate::error::Result;
use crate::github::{GithubGateway, Issue};
use crate::lock::{self, LockDir};
use crate::slack::SlackNotifier;
use crate::status::{memory_usage_kb, StatusRecord, StatusWriter};
use crate::tmux::Multiplexer;
use crate::workflow::executor::{ExecutionOutcome, PhaseExecutor};
use crate::workflow::phase::{self, Phase};

const ISSUE_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// Nothing to do: agent mid-phase, no actionable label, or the CAS lost.
    Skipped { reason: String },
    /// Label transitioned, but the phase has no configured command.
    WorkflowSkipped { phase: Phase },
    /// Label transitioned and the phase command launched.
    Executed {
        phase: Phase,
        execution: ExecutionOutcome,
    },
}

pub struct IssueProcessor<'a, G: GithubGateway, M: Multiplexer, C: Clock> {
    gateway: &'a G,
    executor: &'a PhaseExecutor<'a, M, C>,
    locks: &'a LockDir,
    slack: &'a SlackNotifier,
    status: &'a StatusWriter,
    clock: &'a C,
}

impl<'a, G: GithubGateway, M: Multiplexer, C: Clock> IssueProcessor<'a, G, M, C> {
    pub fn new(
        gateway: &'a G,
        executor: &'a PhaseExecutor<'a, M, C>,
        locks: &'a LockDir,
        slack: &'a SlackNotifier,
        status: &'a StatusWriter,
        clock: &'a C,
    ) -> Self {
        Self {
            gateway,
            executor,
            locks,
            slack,
            status,
            clock,
        }
    }

    pub fn process(&self, repo: &str, issue: &Issue) -> Result<ProcessOutcome> {
        let Some(phase) = phase::determine_phase(&issue.labels) else {
            return Ok(ProcessOutcome::Skipped {
                reason: "in-progress or unknown".into(),
            });
        };
        let (from, to) = phase.edge();
        debug_assert!(phase::validate_transition(from, to));

        // Serialize re-entries for this issue within the daemon.
        let key = lock::issue_key(repo, issue.number);
        self.locks
            .with_lock(&key, ISSUE_LOCK_TIMEOUT, || {
                self.process_locked(repo, issue, phase, from, to)
            })?
    }

    fn process_locked(
        &self,
        repo: &str,
        issue: &Issue,
        phase: Phase,
        from: &str,
        to: &str,
    ) -> Result<ProcessOutcome> {
        let command_configured = self
            .executor
            .config()
            .phase
            .get(phase.command_key())
            .is_some();

        let swapped = self
            .gateway
            .update_labels_with_check(repo, issue.number, from, to)?;
        if !swapped {
            info!(issue = issue.number, from, to, "label state changed, skipping");
            return Ok(ProcessOutcome::Skipped {
                reason: "label state changed".into(),
            });
        }
        info!(issue = issue.number, from, to, "label transitioned");

        if !command_configured {
            warn!(
                issue = issue.number,
                phase = %phase,
                "phase has no configured command, transition only"
            );
            self.write_status(issue.number, to, false);
            return Ok(ProcessOutcome::WorkflowSkipped { phase });
        }

        self.slack
            .notify_phase_start(repo, issue.number, phase.as_str());

        let execution = self.executor.execute(repo, phase, issue.number)?;
        self.write_status(issue.number, to, true);

        Ok(ProcessOutcome::Executed { phase, execution })
    }

    fn write_status(&self, issue: u64, label: &str, executed: bool) {
        let record = StatusRecord {
            pid: std::process::id(),
            mode: self.executor.mode().as_str().to_string(),
            current_issue: Some(issue),
            current_phase_label: Some(label.to_string()),
            last_completed: executed.then(|| self.clock.now().to_rfc3339()),
            memory_kb: memory_usage_kb(),
            updated_at: self.clock.now().to_rfc3339(),
        };
        if let Err(e) = self.status.write(&record) {
            warn!(error = %e, "status write failed");
        }
    }
}
