use std::fs;
use std::io::Write as IoWrite;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use soba_core::{
    clock::SystemClock,
    config::{self, default_config_yaml, Config},
    daemon::{self, PidFile, StoppingSentinel},
    github::{auth, rest::RestGateway, GithubGateway},
    labels,
    lock::LockDir,
    status::read_status,
    tmux::{self, SessionManager, TmuxClient},
    workflow::{self, ControlLoop, ProcessOutcome},
};

use crate::daemonize;

#[derive(Parser)]
#[command(
    name = "soba",
    version,
    about = "GitHub issue workflow orchestrator",
    long_about = "soba polls a GitHub repository and drives issues through\n\
                  plan -> implement -> review -> revise phases, launching an\n\
                  external coding agent in a tmux pane for each phase."
)]
pub struct Cli {
    /// State directory (defaults to ./.soba when present, else ~/.soba)
    #[arg(long, global = true)]
    pub state_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Write the default config and create the workflow labels on GitHub
    Init {
        /// Prompt for the repository instead of writing a placeholder
        #[arg(long)]
        interactive: bool,
    },

    /// Run the control loop, or one-shot a single issue
    Start {
        /// Process this one issue, then exit
        issue: Option<u64>,

        /// Detach and run in the background
        #[arg(long)]
        daemon: bool,

        /// Spawn phase commands directly instead of in tmux panes
        #[arg(long = "no-tmux")]
        no_tmux: bool,
    },

    /// Stop the running daemon
    Stop {
        /// Kill immediately instead of waiting for a graceful exit
        #[arg(long)]
        force: bool,

        /// Seconds to wait for graceful termination before force-killing
        #[arg(long, default_value_t = 30)]
        timeout: u64,
    },

    /// Show daemon status
    Status {
        /// Also print the last N log lines
        #[arg(long)]
        log: Option<usize>,

        /// Machine-readable output
        #[arg(long)]
        json: bool,
    },

    /// Attach to the tmux session (or a specific issue's window)
    Open {
        /// Issue number whose window to open
        issue: Option<u64>,

        /// List issue windows instead of attaching
        #[arg(long)]
        list: bool,
    },

    /// Print the effective configuration
    Config,
}

/// Dispatch a parsed CLI invocation. Returns the process exit code.
pub fn run(cli: Cli) -> i32 {
    let state_dir = cli
        .state_dir
        .clone()
        .unwrap_or_else(config::default_state_dir);

    let result = match cli.command {
        Commands::Init { interactive } => cmd_init(&state_dir, interactive),
        Commands::Start {
            issue,
            daemon,
            no_tmux,
        } => cmd_start(&state_dir, issue, daemon, no_tmux),
        Commands::Stop { force, timeout } => cmd_stop(&state_dir, force, timeout),
        Commands::Status { log, json } => return cmd_status(&state_dir, log, json),
        Commands::Open { issue, list } => cmd_open(&state_dir, issue, list),
        Commands::Config => cmd_config(&state_dir),
    };

    match result {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("soba: {e:#}");
            1
        }
    }
}

// ── init ─────────────────────────────────────────────────────────────────────

fn cmd_init(state_dir: &Path, interactive: bool) -> Result<()> {
    fs::create_dir_all(state_dir.join("logs"))?;
    let config_path = state_dir.join("config.yml");

    if config_path.exists() {
        println!("Config exists: {}", config_path.display());
    } else {
        let repository = if interactive {
            prompt("GitHub repository (owner/name): ")?
        } else {
            "owner/name".to_string()
        };
        fs::write(&config_path, default_config_yaml(&repository))?;
        println!("Wrote {}", config_path.display());
    }

    let config = Config::load(state_dir)?;
    if config.github.repository == "owner/name" {
        println!("Edit github.repository in config.yml, then re-run `soba init` to create labels.");
        return Ok(());
    }

    let token = auth::resolve_token(config.github.auth_method)?;
    let gateway = RestGateway::new(token)?;
    create_workflow_labels(&gateway, &config.github.repository)?;
    println!(
        "Workflow labels ready on {}",
        config.github.repository
    );
    Ok(())
}

fn create_workflow_labels(gateway: &impl GithubGateway, repo: &str) -> Result<()> {
    for def in labels::DEFINITIONS {
        gateway
            .create_label(repo, def.name, def.color, def.description)
            .with_context(|| format!("creating label {}", def.name))?;
    }
    Ok(())
}

fn prompt(message: &str) -> Result<String> {
    print!("{message}");
    std::io::stdout().flush()?;
    let mut line = String::new();
    std::io::stdin().read_line(&mut line)?;
    let answer = line.trim().to_string();
    if answer.is_empty() {
        bail!("no repository given");
    }
    Ok(answer)
}

// ── start ────────────────────────────────────────────────────────────────────

fn cmd_start(state_dir: &Path, issue: Option<u64>, run_daemon: bool, no_tmux: bool) -> Result<()> {
    let config = Config::load(state_dir)?;

    // Auth preflight: fail fast with an actionable message while stderr is
    // still attached to the operator's terminal.
    let token = auth::resolve_token(config.github.auth_method)
        .context("cannot authenticate with GitHub")?;

    let use_tmux = config.workflow.use_tmux && !no_tmux;
    if use_tmux && !tmux::tmux_installed() {
        eprintln!("soba: tmux not found on PATH; falling back to direct mode");
    }

    if run_daemon && issue.is_none() {
        // Fork before anything spawns threads: the HTTP client keeps a
        // background runtime thread that would not survive into the child.
        daemonize::daemonize()?;
    }
    init_tracing(state_dir, run_daemon && issue.is_none())?;

    let gateway = RestGateway::new(token)?;
    let session_manager = use_tmux
        .then(TmuxClient::detect)
        .flatten()
        .map(|client| {
            SessionManager::new(client, LockDir::new(state_dir), config.workflow.max_panes)
        });

    if let Some(issue_number) = issue {
        let outcome = workflow::control_loop::process_single_issue(
            &config,
            state_dir,
            &gateway,
            session_manager.as_ref(),
            &SystemClock,
            issue_number,
        )?;
        print_outcome(issue_number, &outcome);
        return Ok(());
    }

    daemonize::install_signal_handlers();
    let _pid = PidFile::acquire(state_dir)?;
    // A leftover sentinel from an earlier stop must not kill this run.
    StoppingSentinel::new(state_dir).clear()?;

    let mut control_loop =
        ControlLoop::new(config, state_dir, gateway, session_manager, SystemClock);
    control_loop.run()?;
    Ok(())
}

fn print_outcome(issue: u64, outcome: &ProcessOutcome) {
    match outcome {
        ProcessOutcome::Skipped { reason } => println!("issue #{issue}: skipped ({reason})"),
        ProcessOutcome::WorkflowSkipped { phase } => {
            println!("issue #{issue}: {phase} label transitioned (no command configured)")
        }
        ProcessOutcome::Executed { phase, .. } => println!("issue #{issue}: {phase} launched"),
    }
}

fn init_tracing(state_dir: &Path, to_file: bool) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    if to_file {
        let appender = tracing_appender::rolling::daily(state_dir.join("logs"), "daemon.log");
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(appender)
            .with_ansi(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
    Ok(())
}

// ── stop ─────────────────────────────────────────────────────────────────────

fn cmd_stop(state_dir: &Path, force: bool, timeout: u64) -> Result<()> {
    let Some(pid) = daemon::read_pid(state_dir) else {
        bail!("soba is not running (no PID file)");
    };
    if !daemon::is_pid_alive(pid) {
        fs::remove_file(PidFile::path_in(state_dir)).ok();
        bail!("soba is not running (stale PID {pid})");
    }

    if force {
        signal(pid, "-KILL");
    } else {
        // Ask nicely twice: the sentinel covers a daemon between signal
        // checks, SIGTERM covers one sleeping in a tick.
        StoppingSentinel::new(state_dir).set()?;
        signal(pid, "-TERM");

        let deadline = Instant::now() + Duration::from_secs(timeout);
        while daemon::is_pid_alive(pid) && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(500));
        }
        if daemon::is_pid_alive(pid) {
            eprintln!("soba: PID {pid} did not exit within {timeout}s; force-killing");
            signal(pid, "-KILL");
        }
    }

    fs::remove_file(PidFile::path_in(state_dir)).ok();
    StoppingSentinel::new(state_dir).clear().ok();
    println!("Stopped soba (PID {pid})");
    Ok(())
}

fn signal(pid: u32, sig: &str) {
    let _ = std::process::Command::new("kill")
        .args([sig, &pid.to_string()])
        .status();
}

// ── status ───────────────────────────────────────────────────────────────────

fn cmd_status(state_dir: &Path, log: Option<usize>, json: bool) -> i32 {
    let pid = daemon::read_pid(state_dir);
    let running = pid.is_some_and(daemon::is_pid_alive);
    let record = read_status(state_dir).ok().flatten();

    if json {
        let doc = serde_json::json!({
            "running": running,
            "pid": pid,
            "status": record,
        });
        println!("{}", serde_json::to_string_pretty(&doc).unwrap_or_default());
    } else {
        println!("soba: {}", if running { "running" } else { "stopped" });
        if let Some(pid) = pid {
            println!("PID: {pid}");
        }
        if let Some(record) = &record {
            println!("Mode: {}", record.mode);
            match record.current_issue {
                Some(n) => println!(
                    "Active issue: #{n} ({})",
                    record.current_phase_label.as_deref().unwrap_or("unknown")
                ),
                None => println!("Active issue: none"),
            }
            if let Some(t) = &record.last_completed {
                println!("Last completed: {t}");
            }
            if let Some(kb) = record.memory_kb {
                println!("Memory: {kb} kB");
            }
            println!("Updated: {}", record.updated_at);
        }
    }

    if let Some(n) = log {
        match tail_log(state_dir, n) {
            Some(lines) => {
                println!("--- last {n} log line(s) ---");
                for line in lines {
                    println!("{line}");
                }
            }
            None => println!("(no log file)"),
        }
    }

    if running {
        0
    } else {
        1
    }
}

/// Last `n` lines of the newest file in `<state_dir>/logs/`.
fn tail_log(state_dir: &Path, n: usize) -> Option<Vec<String>> {
    let newest = fs::read_dir(state_dir.join("logs"))
        .ok()?
        .flatten()
        .filter(|e| e.path().is_file())
        .max_by_key(|e| e.metadata().and_then(|m| m.modified()).ok())?;
    let content = fs::read_to_string(newest.path()).ok()?;
    let lines: Vec<String> = content.lines().map(str::to_string).collect();
    let start = lines.len().saturating_sub(n);
    Some(lines[start..].to_vec())
}

// ── open ─────────────────────────────────────────────────────────────────────

fn cmd_open(state_dir: &Path, issue: Option<u64>, list: bool) -> Result<()> {
    let config = Config::load(state_dir)?;
    let repo = &config.github.repository;

    let client = TmuxClient::detect().ok_or(soba_core::Error::TmuxMissing)?;

    let session = find_session(&client, state_dir, repo)
        .ok_or_else(|| anyhow::anyhow!("no soba session for {repo}; is the daemon running?"))?;

    let manager = SessionManager::new(client, LockDir::new(state_dir), config.workflow.max_panes);

    if list {
        let windows = manager.list_issue_windows(&session);
        if windows.is_empty() {
            println!("No issue windows in {session}");
        }
        for w in windows {
            println!("issue-{}\t{}", w.issue_number, w.window_id);
        }
        return Ok(());
    }

    match issue {
        Some(n) => {
            let window = manager
                .find_issue_window(&session, n)
                .ok_or_else(|| anyhow::anyhow!("no window for issue #{n} in {session}"))?;
            if !manager.mux().attach_window(&session, &window) {
                bail!("could not attach to {session}");
            }
        }
        None => {
            if !manager.mux().attach_session(&session) {
                bail!("could not attach to {session}");
            }
        }
    }
    Ok(())
}

/// Resolve the session name: the modern `soba-<slug>` first, then the
/// legacy PID-suffixed variant of the running daemon.
fn find_session(client: &TmuxClient, state_dir: &Path, repo: &str) -> Option<String> {
    use soba_core::tmux::Multiplexer;

    let name = tmux::session_name(repo);
    if client.has_session(&name) {
        return Some(name);
    }
    let pid = daemon::read_pid(state_dir)?;
    let legacy = format!("{name}-{pid}");
    client.has_session(&legacy).then_some(legacy)
}

// ── config ───────────────────────────────────────────────────────────────────

fn cmd_config(state_dir: &Path) -> Result<()> {
    let config = Config::load(state_dir)?;
    print!("{}", serde_yaml::to_string(&config)?);
    Ok(())
}
