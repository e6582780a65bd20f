//! The top-level poll loop.
//!
//! Each tick is a linear sequence: fetch → queue → merge → clean → process
//! → status. State is re-derived from GitHub every tick; a failed step ends
//! the tick and the next one starts clean. Cooperative single-threaded: the
//! only suspension points are HTTP calls, subprocess execution, and the
//! sleep between ticks.

use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{error, info, warn};

use crate::clock::Clock;
use crate::config::Config;
use crate::daemon::{self, StoppingSentinel};
use crate::error::{Error, Result};
use crate::github::{GithubGateway, Issue};
use crate::labels;
use crate::lock::LockDir;
use crate::slack::SlackNotifier;
use crate::status::{memory_usage_kb, StatusRecord, StatusWriter};
use crate::tmux::{Multiplexer, SessionManager};
use crate::workflow::auto_merge::{AutoMerger, MergeReport};
use crate::workflow::blocking;
use crate::workflow::cleaner::{CleanReport, ClosedWindowCleaner};
use crate::workflow::executor::{PhaseExecutor, RunMode};
use crate::workflow::phase::{self, Phase};
use crate::workflow::processor::{IssueProcessor, ProcessOutcome};
use crate::workflow::queueing;

/// What one tick did. Mostly for tests and log summaries.
#[derive(Debug, Default)]
pub struct TickSummary {
    pub promoted: Option<u64>,
    pub processed: Option<(u64, ProcessOutcome)>,
    pub merge_report: Option<MergeReport>,
    pub cleaned: Option<CleanReport>,
    /// More than one active issue was observed; processing was skipped.
    pub anomaly: bool,
}

pub struct ControlLoop<G: GithubGateway, M: Multiplexer, C: Clock> {
    config: Config,
    gateway: G,
    /// None when tmux is unavailable or disabled: direct mode.
    session_manager: Option<SessionManager<M>>,
    clock: C,
    locks: LockDir,
    slack: SlackNotifier,
    status: StatusWriter,
    stopping: StoppingSentinel,
    last_cleanup: Option<DateTime<Utc>>,
    last_completed: Option<String>,
}

impl<G: GithubGateway, M: Multiplexer, C: Clock> ControlLoop<G, M, C> {
    pub fn new(
        config: Config,
        state_dir: &Path,
        gateway: G,
        session_manager: Option<SessionManager<M>>,
        clock: C,
    ) -> Self {
        let slack = SlackNotifier::new(&config.slack);
        Self {
            config,
            gateway,
            session_manager,
            clock,
            locks: LockDir::new(state_dir),
            slack,
            status: StatusWriter::new(state_dir),
            stopping: StoppingSentinel::new(state_dir),
            last_cleanup: None,
            last_completed: None,
        }
    }

    pub fn mode(&self) -> RunMode {
        if self.session_manager.is_some() {
            RunMode::Tmux
        } else {
            RunMode::Direct
        }
    }

    /// Poll until a shutdown signal or the stopping sentinel appears.
    pub fn run(&mut self) -> Result<()> {
        info!(
            repo = %self.config.github.repository,
            interval_s = self.config.workflow.interval,
            mode = self.mode().as_str(),
            "control loop started"
        );
        loop {
            if daemon::shutdown_requested() || self.stopping.is_set() {
                info!("shutdown requested, stopping");
                break;
            }
            match self.tick() {
                Ok(_) => {}
                Err(Error::RateLimited { reset_epoch }) => {
                    let now = self.clock.now().timestamp().max(0) as u64;
                    let wait = reset_epoch.saturating_sub(now) + 1;
                    warn!(wait_s = wait, "rate limited, sleeping until reset");
                    self.clock.sleep(Duration::from_secs(wait));
                }
                Err(e) => error!(error = %e, "tick failed"),
            }
            self.clock.sleep(self.config.interval());
        }
        let _ = self.stopping.clear();
        Ok(())
    }

    /// One iteration of the loop.
    pub fn tick(&mut self) -> Result<TickSummary> {
        let repo = self.config.github.repository.clone();
        let mut summary = TickSummary::default();

        let mut issues = self.gateway.list_open_issues(&repo)?;

        // Backlog promotion, then refresh so this tick sees its own write.
        let todo_count = issues.iter().filter(|i| i.has_label(labels::TODO)).count();
        if todo_count > 0 && !blocking::is_blocked(&issues) {
            if let Some(promoted) = queueing::queue_next_issue(&self.gateway, &repo, &issues)? {
                summary.promoted = Some(promoted.number);
                issues = self.gateway.list_open_issues(&repo)?;
            }
        }

        let mut processable: Vec<&Issue> = issues
            .iter()
            .filter(|i| {
                !matches!(
                    phase::determine_phase(&i.labels),
                    None | Some(Phase::Plan)
                )
            })
            .collect();
        processable.sort_by_key(|i| i.number);

        if self.config.workflow.auto_merge {
            let report = AutoMerger::new(&self.gateway, &self.slack).run(&repo)?;
            if !report.is_empty() {
                info!(merged = ?report.merged, failed = ?report.failed, "auto-merge sweep");
            }
            summary.merge_report = Some(report);
        }

        if self.cleanup_due() {
            if let Some(manager) = &self.session_manager {
                let report = ClosedWindowCleaner::new(&self.gateway, manager.mux()).run(&repo)?;
                self.last_cleanup = Some(self.clock.now());
                summary.cleaned = Some(report);
            }
        }

        if let Some(candidate) = processable.first() {
            if blocking::count_active(&issues) > 1 {
                warn!("multiple active issues detected, skipping processing this tick");
                summary.anomaly = true;
            } else {
                let executor =
                    PhaseExecutor::new(&self.config, self.session_manager.as_ref(), &self.clock);
                let processor = IssueProcessor::new(
                    &self.gateway,
                    &executor,
                    &self.locks,
                    &self.slack,
                    &self.status,
                    &self.clock,
                );
                let outcome = processor.process(&repo, candidate)?;
                if matches!(outcome, ProcessOutcome::Executed { .. }) {
                    self.last_completed = Some(self.clock.now().to_rfc3339());
                }
                summary.processed = Some((candidate.number, outcome));
            }
        }

        self.write_status(&issues);
        Ok(summary)
    }

    fn cleanup_due(&self) -> bool {
        if !self.config.workflow.cleanup_enabled || self.session_manager.is_none() {
            return false;
        }
        match self.last_cleanup {
            None => true,
            Some(last) => {
                let elapsed = (self.clock.now() - last).to_std().unwrap_or_default();
                elapsed >= self.config.cleanup_interval()
            }
        }
    }

    fn write_status(&self, issues: &[Issue]) {
        let active = issues
            .iter()
            .find(|i| labels::contains_any(&i.labels, &labels::ACTIVE));
        let record = StatusRecord {
            pid: std::process::id(),
            mode: self.mode().as_str().to_string(),
            current_issue: active.map(|i| i.number),
            current_phase_label: active.and_then(|i| {
                i.labels
                    .iter()
                    .find(|l| labels::ACTIVE.contains(&l.as_str()))
                    .cloned()
            }),
            last_completed: self.last_completed.clone(),
            memory_kb: memory_usage_kb(),
            updated_at: self.clock.now().to_rfc3339(),
        };
        if let Err(e) = self.status.write(&record) {
            warn!(error = %e, "status write failed");
        }
    }
}

/// The one-shot developer path: `soba start <issue>` drives a single issue
/// through exactly one phase and exits.
///
/// A `todo` issue takes the legacy direct `todo → planning` edge with an
/// unchecked label replace; everything else goes through the normal
/// processor.
pub fn process_single_issue<G: GithubGateway, M: Multiplexer, C: Clock>(
    config: &Config,
    state_dir: &Path,
    gateway: &G,
    session_manager: Option<&SessionManager<M>>,
    clock: &C,
    issue_number: u64,
) -> Result<ProcessOutcome> {
    let repo = &config.github.repository;
    let issue = gateway
        .list_open_issues(repo)?
        .into_iter()
        .find(|i| i.number == issue_number)
        .ok_or_else(|| {
            Error::Unexpected(format!("issue #{issue_number} is not an open issue in {repo}"))
        })?;

    let executor = PhaseExecutor::new(config, session_manager, clock);

    if issue.has_label(labels::TODO) {
        debug_assert!(phase::validate_transition(labels::TODO, labels::PLANNING));
        gateway.update_labels(repo, issue_number, &[labels::TODO], &[labels::PLANNING])?;
        info!(issue = issue_number, "one-shot: todo -> planning");
        if config.phase.get(Phase::QueuedToPlanning.command_key()).is_none() {
            return Ok(ProcessOutcome::WorkflowSkipped {
                phase: Phase::QueuedToPlanning,
            });
        }
        let execution = executor.execute(repo, Phase::QueuedToPlanning, issue_number)?;
        return Ok(ProcessOutcome::Executed {
            phase: Phase::QueuedToPlanning,
            execution,
        });
    }

    let locks = LockDir::new(state_dir);
    let slack = SlackNotifier::disabled();
    let status = StatusWriter::new(state_dir);
    let processor = IssueProcessor::new(gateway, &executor, &locks, &slack, &status, clock);
    processor.process(repo, &issue)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::testing::FakeClock;
    use crate::tmux::client::testing::FakeMux;
    use crate::workflow::blocking::issue;
    use crate::workflow::testing::FakeGateway;
    use tempfile::TempDir;

    fn loop_with(
        dir: &TempDir,
        gateway: FakeGateway,
        yaml: &str,
        with_tmux: bool,
    ) -> ControlLoop<FakeGateway, FakeMux, FakeClock> {
        let config = Config::parse(yaml).unwrap();
        let manager = with_tmux.then(|| {
            SessionManager::new(FakeMux::new(), LockDir::new(dir.path()), 3)
        });
        ControlLoop::new(
            config,
            dir.path(),
            gateway,
            manager,
            FakeClock::at("2025-06-01T00:00:00Z".parse().unwrap()),
        )
    }

    const BARE: &str = "github:\n  repository: a/b\n";

    #[test]
    fn queueing_under_empty_slot_promotes_then_processes() {
        let dir = TempDir::new().unwrap();
        let gateway = FakeGateway::with_issues(vec![
            issue(7, &["todo"]),
            issue(5, &["todo"]),
            issue(9, &["ready"]),
        ]);
        let mut cl = loop_with(&dir, gateway, BARE, false);

        let summary = cl.tick().unwrap();

        // Lowest todo promoted, then chosen over the higher-numbered ready
        // issue for processing.
        assert_eq!(summary.promoted, Some(5));
        let (processed, _) = summary.processed.unwrap();
        assert_eq!(processed, 5);
        assert_eq!(cl.gateway.labels_of(5), vec!["planning"]);
        assert_eq!(cl.gateway.labels_of(9), vec!["ready"]);
        assert_eq!(
            cl.gateway.cas_calls(),
            vec![
                (5, "todo".to_string(), "queued".to_string()),
                (5, "queued".to_string(), "planning".to_string()),
            ]
        );
    }

    #[test]
    fn queueing_blocked_by_in_progress_issue() {
        let dir = TempDir::new().unwrap();
        let gateway =
            FakeGateway::with_issues(vec![issue(4, &["planning"]), issue(8, &["todo"])]);
        let mut cl = loop_with(&dir, gateway, BARE, false);

        let summary = cl.tick().unwrap();

        assert_eq!(summary.promoted, None);
        // Neither issue is processable: #4 is in progress, #8 only todo.
        assert!(summary.processed.is_none());
        assert!(cl.gateway.cas_calls().is_empty());
    }

    #[test]
    fn multiple_active_issues_skip_processing() {
        let dir = TempDir::new().unwrap();
        let gateway = FakeGateway::with_issues(vec![
            issue(1, &["doing"]),
            issue(2, &["planning"]),
            issue(3, &["review-requested"]),
        ]);
        let mut cl = loop_with(&dir, gateway, BARE, false);

        let summary = cl.tick().unwrap();
        assert!(summary.anomaly);
        assert!(summary.processed.is_none());
        assert!(cl.gateway.cas_calls().is_empty());
    }

    #[test]
    fn review_requested_issue_moves_to_reviewing() {
        let dir = TempDir::new().unwrap();
        let gateway = FakeGateway::with_issues(vec![issue(12, &["review-requested"])]);
        let mut cl = loop_with(&dir, gateway, BARE, false);

        let summary = cl.tick().unwrap();
        let (number, _) = summary.processed.unwrap();
        assert_eq!(number, 12);
        assert_eq!(cl.gateway.labels_of(12), vec!["reviewing"]);
    }

    #[test]
    fn requires_changes_issue_moves_to_revising() {
        let dir = TempDir::new().unwrap();
        let gateway = FakeGateway::with_issues(vec![issue(12, &["requires-changes"])]);
        let mut cl = loop_with(&dir, gateway, BARE, false);

        cl.tick().unwrap();
        assert_eq!(cl.gateway.labels_of(12), vec!["revising"]);
    }

    #[test]
    fn done_issue_with_approved_pr_is_merged_and_closed() {
        let dir = TempDir::new().unwrap();
        let gateway = FakeGateway::with_issues(vec![issue(12, &["done"])]);
        gateway
            .prs
            .borrow_mut()
            .push(FakeGateway::pr(40, "fixes #12", Some(true), "clean"));
        let mut cl = loop_with(&dir, gateway, BARE, false);

        let summary = cl.tick().unwrap();
        let report = summary.merge_report.unwrap();
        assert_eq!(report.merged, vec![40]);
        assert_eq!(
            cl.gateway.closed_with_label.borrow().as_slice(),
            &[(12, "merged".to_string())]
        );
        // A done issue is not processable; nothing else runs this tick.
        assert!(summary.processed.is_none());
    }

    #[test]
    fn auto_merge_disabled_skips_sweep() {
        let dir = TempDir::new().unwrap();
        let gateway = FakeGateway::default();
        gateway
            .prs
            .borrow_mut()
            .push(FakeGateway::pr(40, "fixes #12", Some(true), "clean"));
        let yaml = "github:\n  repository: a/b\nworkflow:\n  auto_merge: false\n";
        let mut cl = loop_with(&dir, gateway, yaml, false);

        let summary = cl.tick().unwrap();
        assert!(summary.merge_report.is_none());
        assert!(cl.gateway.merged_prs.borrow().is_empty());
    }

    #[test]
    fn cleaner_runs_on_interval_only() {
        let dir = TempDir::new().unwrap();
        let mut cl = loop_with(&dir, FakeGateway::default(), BARE, true);

        // First tick: due (never ran).
        let s1 = cl.tick().unwrap();
        assert!(s1.cleaned.is_some());

        // 20s later: not due.
        cl.clock.advance(Duration::from_secs(20));
        let s2 = cl.tick().unwrap();
        assert!(s2.cleaned.is_none());

        // Past the 300s interval: due again.
        cl.clock.advance(Duration::from_secs(300));
        let s3 = cl.tick().unwrap();
        assert!(s3.cleaned.is_some());
    }

    #[test]
    fn cleaner_disabled_in_direct_mode() {
        let dir = TempDir::new().unwrap();
        let mut cl = loop_with(&dir, FakeGateway::default(), BARE, false);
        let summary = cl.tick().unwrap();
        assert!(summary.cleaned.is_none());
    }

    #[test]
    fn tick_writes_status_record() {
        let dir = TempDir::new().unwrap();
        let gateway = FakeGateway::with_issues(vec![issue(6, &["doing"])]);
        let mut cl = loop_with(&dir, gateway, BARE, false);

        cl.tick().unwrap();
        let record = crate::status::read_status(dir.path()).unwrap().unwrap();
        assert_eq!(record.current_issue, Some(6));
        assert_eq!(record.current_phase_label.as_deref(), Some("doing"));
        assert_eq!(record.mode, "direct");
    }

    #[test]
    fn tick_propagates_listing_failure() {
        let dir = TempDir::new().unwrap();
        let gateway = FakeGateway::default();
        *gateway.list_error_status.borrow_mut() = Some(500);
        let mut cl = loop_with(&dir, gateway, BARE, false);
        assert!(cl.tick().is_err());
    }

    #[test]
    fn one_shot_todo_takes_legacy_edge() {
        let dir = TempDir::new().unwrap();
        let config = Config::parse(BARE).unwrap();
        let gateway = FakeGateway::with_issues(vec![issue(3, &["todo"])]);
        let clock = FakeClock::at("2025-06-01T00:00:00Z".parse().unwrap());

        let outcome = process_single_issue::<_, FakeMux, _>(
            &config,
            dir.path(),
            &gateway,
            None,
            &clock,
            3,
        )
        .unwrap();

        // Unchecked replace, not a CAS.
        assert!(gateway.cas_calls().is_empty());
        assert_eq!(gateway.labels_of(3), vec!["planning"]);
        assert!(matches!(outcome, ProcessOutcome::WorkflowSkipped { .. }));
    }

    #[test]
    fn one_shot_non_todo_uses_processor() {
        let dir = TempDir::new().unwrap();
        let config = Config::parse(BARE).unwrap();
        let gateway = FakeGateway::with_issues(vec![issue(4, &["ready"])]);
        let clock = FakeClock::at("2025-06-01T00:00:00Z".parse().unwrap());

        process_single_issue::<_, FakeMux, _>(&config, dir.path(), &gateway, None, &clock, 4)
            .unwrap();

        assert_eq!(gateway.cas_calls().len(), 1);
        assert_eq!(gateway.labels_of(4), vec!["doing"]);
    }

    #[test]
    fn one_shot_missing_issue_errors() {
        let dir = TempDir::new().unwrap();
        let config = Config::parse(BARE).unwrap();
        let gateway = FakeGateway::default();
        let clock = FakeClock::at("2025-06-01T00:00:00Z".parse().unwrap());
        assert!(process_single_issue::<_, FakeMux, _>(
            &config,
            dir.path(),
            &gateway,
            None,
            &clock,
            9
        )
        .is_err());
    }
}
