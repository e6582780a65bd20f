//! Daemon configuration.
//!
//! Loaded once at startup from `<state_dir>/config.yml` and passed around as
//! an immutable record. `${VAR}` references in the raw YAML are replaced
//! with environment values before parsing, so secrets like webhook URLs
//! never live in the file itself.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// How the GitHub token is obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMethod {
    /// Ask the `gh` CLI (`gh auth token`).
    Gh,
    /// Read the `GITHUB_TOKEN` environment variable.
    Env,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GithubConfig {
    /// `gh`, `env`, or absent for auto (gh first, then env).
    #[serde(default)]
    pub auth_method: Option<AuthMethod>,
    /// Repository in `owner/name` form. Required.
    #[serde(default)]
    pub repository: String,
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            auth_method: None,
            repository: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    /// Seconds between polling ticks.
    pub interval: u64,
    /// Host phase commands inside tmux panes. When false (or tmux is not
    /// installed) commands are spawned directly.
    pub use_tmux: bool,
    /// Run the lgtm auto-merge sweep each tick.
    pub auto_merge: bool,
    /// Run the closed-issue window cleaner.
    pub cleanup_enabled: bool,
    /// Seconds between cleaner sweeps.
    pub cleanup_interval: u64,
    /// Seconds to wait after creating a pane before sending the command,
    /// so the shell inside has time to initialize.
    pub command_delay: u64,
    /// Panes kept per issue window; the oldest is evicted beyond this.
    pub max_panes: usize,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            interval: 20,
            use_tmux: true,
            auto_merge: true,
            cleanup_enabled: true,
            cleanup_interval: 300,
            command_delay: 3,
            max_panes: 3,
        }
    }
}

/// Command template for one phase. `{{issue-number}}` in `parameter` is
/// replaced with the issue number at launch time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseCommand {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub parameter: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PhaseConfigs {
    pub plan: Option<PhaseCommand>,
    pub implement: Option<PhaseCommand>,
    pub review: Option<PhaseCommand>,
    pub revise: Option<PhaseCommand>,
}

impl PhaseConfigs {
    /// Look up the command template for a phase key (`plan`, `implement`,
    /// `review`, `revise`). Unknown keys return None.
    pub fn get(&self, key: &str) -> Option<&PhaseCommand> {
        match key {
            "plan" => self.plan.as_ref(),
            "implement" => self.implement.as_ref(),
            "review" => self.review.as_ref(),
            "revise" => self.revise.as_ref(),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SlackConfig {
    pub webhook_url: Option<String>,
    pub enabled: bool,
}

impl Default for SlackConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            enabled: false,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub github: GithubConfig,
    pub workflow: WorkflowConfig,
    pub phase: PhaseConfigs,
    pub slack: SlackConfig,
}

impl Config {
    /// Load and validate `<state_dir>/config.yml`.
    pub fn load(state_dir: &Path) -> Result<Self> {
        let path = state_dir.join("config.yml");
        let raw = fs::read_to_string(&path).map_err(|e| {
            Error::Config(format!(
                "cannot read {} ({e}); run `soba init` first",
                path.display()
            ))
        })?;
        Self::parse(&raw)
    }

    /// Parse config from raw YAML text (after `${VAR}` interpolation).
    pub fn parse(raw: &str) -> Result<Self> {
        let interpolated = interpolate_env(raw);
        let cfg: Config = serde_yaml::from_str(&interpolated)
            .map_err(|e| Error::Config(format!("invalid config.yml: {e}")))?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<()> {
        if self.github.repository.is_empty() {
            return Err(Error::Config(
                "github.repository is required (owner/name)".into(),
            ));
        }
        if !self.github.repository.contains('/') {
            return Err(Error::Config(format!(
                "github.repository must be owner/name, got {:?}",
                self.github.repository
            )));
        }
        if self.workflow.interval < 1 {
            return Err(Error::Config("workflow.interval must be >= 1".into()));
        }
        Ok(())
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.workflow.interval)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.workflow.cleanup_interval)
    }

    pub fn command_delay(&self) -> Duration {
        Duration::from_secs(self.workflow.command_delay)
    }
}

/// Replace `${VAR}` references with environment values. Unset variables
/// interpolate to the empty string and are reported at warn level so the
/// operator can tell why e.g. the webhook is silently disabled.
fn interpolate_env(raw: &str) -> String {
    static VAR: OnceLock<Regex> = OnceLock::new();
    let re = VAR.get_or_init(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("var regex"));
    re.replace_all(raw, |caps: &regex::Captures| {
        let name = &caps[1];
        match env::var(name) {
            Ok(v) => v,
            Err(_) => {
                tracing::warn!(var = name, "config references unset environment variable");
                String::new()
            }
        }
    })
    .into_owned()
}

/// The config template written by `soba init`.
pub fn default_config_yaml(repository: &str) -> String {
    format!(
        r#"github:
  # gh | env; omit for auto (gh first, then GITHUB_TOKEN)
  auth_method: gh
  repository: {repository}

workflow:
  interval: 20
  use_tmux: true
  auto_merge: true
  cleanup_enabled: true
  cleanup_interval: 300
  command_delay: 3
  max_panes: 3

phase:
  plan:
    command: claude
    args: ["--dangerously-skip-permissions"]
    parameter: "/soba:plan {{{{issue-number}}}}"
  implement:
    command: claude
    args: ["--dangerously-skip-permissions"]
    parameter: "/soba:implement {{{{issue-number}}}}"
  review:
    command: claude
    args: ["--dangerously-skip-permissions"]
    parameter: "/soba:review {{{{issue-number}}}}"
  revise:
    command: claude
    args: ["--dangerously-skip-permissions"]
    parameter: "/soba:revise {{{{issue-number}}}}"

slack:
  webhook_url: ${{SLACK_WEBHOOK_URL}}
  enabled: false
"#
    )
}

/// Resolve the state directory: a project-local `.soba/` wins over the
/// home-level `~/.soba/`.
pub fn default_state_dir() -> PathBuf {
    let local = PathBuf::from(".soba");
    if local.is_dir() {
        return local;
    }
    match env::var("HOME") {
        Ok(home) => Path::new(&home).join(".soba"),
        Err(_) => local,
    }
}
