//! GitHub token resolution.
//!
//! `gh` delegates to the user's existing `gh auth` session via
//! `gh auth token`; `env` reads `GITHUB_TOKEN`. With no method configured,
//! gh is tried first, then the environment.

use std::process::{Command, Stdio};

use crate::config::AuthMethod;
use crate::error::{Error, Result};

pub const TOKEN_ENV_VAR: &str = "GITHUB_TOKEN";

/// Resolve an API token per the configured method.
pub fn resolve_token(method: Option<AuthMethod>) -> Result<String> {
    resolve_with(method, gh_token, env_token)
}

fn resolve_with(
    method: Option<AuthMethod>,
    gh: impl Fn() -> Option<String>,
    env: impl Fn() -> Option<String>,
) -> Result<String> {
    match method {
        Some(AuthMethod::Gh) => gh().ok_or_else(|| {
            Error::Auth("`gh auth token` returned nothing; run `gh auth login`".into())
        }),
        Some(AuthMethod::Env) => {
            env().ok_or_else(|| Error::Auth(format!("{TOKEN_ENV_VAR} is not set")))
        }
        None => gh().or_else(env).ok_or_else(|| {
            Error::Auth(format!(
                "no token found: `gh auth token` failed and {TOKEN_ENV_VAR} is not set"
            ))
        }),
    }
}

/// Fetch the current token via `gh auth token`.
fn gh_token() -> Option<String> {
    let out = Command::new("gh")
        .args(["auth", "token"])
        .stderr(Stdio::null())
        .output()
        .ok()?;
    if !out.status.success() {
        return None;
    }
    let token = String::from_utf8_lossy(&out.stdout).trim().to_string();
    (!token.is_empty()).then_some(token)
}

fn env_token() -> Option<String> {
    std::env::var(TOKEN_ENV_VAR).ok().filter(|t| !t.is_empty())
}
