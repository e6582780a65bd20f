//! Error taxonomy for the workflow loop.
//!
//! Every fallible operation in the core returns one of these kinds so the
//! control loop can decide retry/abort per kind instead of unwinding through
//! layers. The taxonomy is closed: anything unclassifiable lands in
//! [`Error::Unexpected`] and is logged without stopping the daemon.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Missing or invalid configuration. Fatal at startup.
    #[error("configuration error: {0}")]
    Config(String),

    /// GitHub rejected our credentials. Fatal for the tick; operator resolves.
    #[error("github authentication failed: {0}")]
    Auth(String),

    /// API quota exhausted. The loop sleeps until `reset_epoch` + 1s.
    #[error("github rate limit exhausted (resets at epoch {reset_epoch})")]
    RateLimited { reset_epoch: u64 },

    /// Connection or timeout failure talking to GitHub or Slack.
    #[error("network error: {0}")]
    Network(String),

    /// GitHub returned a non-success status we do not retry.
    #[error("github api error ({status}): {message}")]
    Api { status: u16, message: String },

    /// GitHub refused to merge the pull request.
    #[error("pull request #{number} is not mergeable: {reason}")]
    NotMergeable { number: u64, reason: String },

    /// The tmux binary is not on PATH. The daemon downgrades to direct mode.
    #[error("tmux is not installed")]
    TmuxMissing,

    /// A local file lock could not be acquired within its budget.
    #[error("timed out waiting for lock {0}")]
    LockTimeout(String),

    #[error("{0}")]
    Unexpected(String),
}

impl Error {
    /// Whether the retry middleware should try this operation again.
    ///
    /// Connection failures and 5xx/429 responses retry; rate-limit
    /// exhaustion does not (the loop sleeps until reset instead).
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Network(_) => true,
            Error::Api { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Unexpected(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Error::Unexpected(format!("response decode failed: {e}"))
        } else {
            Error::Network(e.to_string())
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Unexpected(format!("json error: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn network_errors_are_retryable() {
        assert!(Error::Network("connection reset".into()).is_retryable());
    }

    #[test]
    fn server_errors_are_retryable() {
        assert!(Error::Api {
            status: 502,
            message: "bad gateway".into()
        }
        .is_retryable());
        assert!(Error::Api {
            status: 429,
            message: "too many requests".into()
        }
        .is_retryable());
    }

    #[test]
    fn client_errors_are_not_retryable() {
        assert!(!Error::Api {
            status: 404,
            message: "not found".into()
        }
        .is_retryable());
        assert!(!Error::Auth("bad token".into()).is_retryable());
    }

    #[test]
    fn rate_limit_is_not_retryable() {
        // The loop handles this kind by sleeping until reset, not by retrying.
        assert!(!Error::RateLimited { reset_epoch: 0 }.is_retryable());
    }
}
