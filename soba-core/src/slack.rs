//! Best-effort Slack notifications.
//!
//! Failures never propagate: a dead webhook must not stall the workflow, so
//! errors are logged at debug and dropped.

use std::time::Duration;

use serde_json::json;
use tracing::debug;

use crate::config::SlackConfig;

pub struct SlackNotifier {
    webhook_url: Option<String>,
}

impl SlackNotifier {
    pub fn new(config: &SlackConfig) -> Self {
        let webhook_url = if config.enabled {
            config.webhook_url.clone().filter(|u| !u.is_empty())
        } else {
            None
        };
        Self { webhook_url }
    }

    /// Disabled notifier for tests and one-shot paths.
    pub fn disabled() -> Self {
        Self { webhook_url: None }
    }

    pub fn notify_phase_start(&self, repo: &str, issue: u64, phase: &str) {
        self.post(&format!("[{repo}] issue #{issue}: {phase} started"));
    }

    pub fn notify_merged(&self, repo: &str, pr: u64, issue: Option<u64>) {
        let text = match issue {
            Some(n) => format!("[{repo}] merged PR #{pr} (issue #{n})"),
            None => format!("[{repo}] merged PR #{pr}"),
        };
        self.post(&text);
    }

    fn post(&self, text: &str) {
        let Some(url) = &self.webhook_url else {
            return;
        };
        let result = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .and_then(|client| client.post(url).json(&json!({ "text": text })).send());
        if let Err(e) = result {
            debug!(error = %e, "slack notification failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_config_never_posts() {
        let notifier = SlackNotifier::new(&SlackConfig {
            webhook_url: Some("http://127.0.0.1:1/hook".into()),
            enabled: false,
        });
        assert!(notifier.webhook_url.is_none());
    }

    #[test]
    fn enabled_without_url_never_posts() {
        let notifier = SlackNotifier::new(&SlackConfig {
            webhook_url: Some(String::new()),
            enabled: true,
        });
        assert!(notifier.webhook_url.is_none());
    }

    #[test]
    fn notify_is_a_noop_when_disabled() {
        // Must not attempt any network traffic.
        SlackNotifier::disabled().notify_phase_start("a/b", 1, "implement");
    }
}
