//! Launches the configured external command for a phase.
//!
//! In tmux mode the command is typed into a fresh pane and the executor
//! returns immediately; the agent signals completion by re-labeling the
//! issue, which a later tick observes. In direct mode (no tmux, or
//! `--no-tmux`) the subprocess runs to completion with captured output.

use std::process::Command;

use tracing::info;

use crate::clock::Clock;
use crate::config::{Config, PhaseCommand};
use crate::error::{Error, Result};
use crate::tmux::{Multiplexer, SessionManager};
use crate::workflow::phase::Phase;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Tmux,
    Direct,
}

impl RunMode {
    pub fn as_str(self) -> &'static str {
        match self {
            RunMode::Tmux => "tmux",
            RunMode::Direct => "direct",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionOutcome {
    /// Command sent to a pane; the agent is now running unattended.
    Tmux {
        session: String,
        window: String,
        pane: String,
    },
    /// Command ran to completion as a direct subprocess.
    Direct {
        exit_code: Option<i32>,
        output: String,
    },
}

pub struct PhaseExecutor<'a, M: Multiplexer, C: Clock> {
    config: &'a Config,
    /// None means direct mode.
    session_manager: Option<&'a SessionManager<M>>,
    clock: &'a C,
}

impl<'a, M: Multiplexer, C: Clock> PhaseExecutor<'a, M, C> {
    pub fn new(
        config: &'a Config,
        session_manager: Option<&'a SessionManager<M>>,
        clock: &'a C,
    ) -> Self {
        Self {
            config,
            session_manager,
            clock,
        }
    }

    pub fn config(&self) -> &Config {
        self.config
    }

    pub fn mode(&self) -> RunMode {
        if self.session_manager.is_some() {
            RunMode::Tmux
        } else {
            RunMode::Direct
        }
    }

    /// Launch the phase command for an issue.
    pub fn execute(&self, repo: &str, phase: Phase, issue: u64) -> Result<ExecutionOutcome> {
        let template = self
            .config
            .phase
            .get(phase.command_key())
            .ok_or_else(|| {
                Error::Config(format!("phase.{} has no command", phase.command_key()))
            })?;
        let argv = build_argv(template, issue);

        match self.session_manager {
            Some(manager) => self.execute_in_pane(manager, repo, phase, issue, &argv),
            None => execute_direct(&argv),
        }
    }

    fn execute_in_pane(
        &self,
        manager: &SessionManager<M>,
        repo: &str,
        phase: Phase,
        issue: u64,
        argv: &[String],
    ) -> Result<ExecutionOutcome> {
        let session = manager.find_or_create_session(repo)?;
        let window = manager.find_or_create_issue_window(&session.name, issue)?;
        let pane = manager.create_phase_pane(&session.name, &window, false)?;

        // Give the shell inside the new pane time to initialize before
        // keystrokes arrive.
        self.clock.sleep(self.config.command_delay());
        manager.mux().send_keys(&pane, &argv.join(" "));

        info!(issue, phase = %phase, pane = %pane, "phase command sent to pane");
        Ok(ExecutionOutcome::Tmux {
            session: session.name,
            window: window.name,
            pane,
        })
    }
}

/// Render the command template: command, fixed args, then the parameter
/// with `{{issue-number}}` substituted.
fn build_argv(template: &PhaseCommand, issue: u64) -> Vec<String> {
    let mut argv = Vec::with_capacity(template.args.len() + 2);
    argv.push(template.command.clone());
    argv.extend(template.args.iter().cloned());
    if let Some(parameter) = &template.parameter {
        argv.push(parameter.replace("{{issue-number}}", &issue.to_string()));
    }
    argv
}

fn execute_direct(argv: &[String]) -> Result<ExecutionOutcome> {
    let out = Command::new(&argv[0])
        .args(&argv[1..])
        .output()
        .map_err(|e| Error::Unexpected(format!("failed to spawn {}: {e}", argv[0])))?;
    let mut output = String::from_utf8_lossy(&out.stdout).into_owned();
    output.push_str(&String::from_utf8_lossy(&out.stderr));
    Ok(ExecutionOutcome::Direct {
        exit_code: out.status.code(),
        output,
    })
}
