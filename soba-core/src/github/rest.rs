//! REST adapter for the [`GithubGateway`] port.
//!
//! Blocking HTTP against api.github.com. Every request goes through the
//! retry middleware; responses are classified into the error taxonomy at
//! this boundary so callers only ever see error kinds, not HTTP details.

use std::time::Duration;

use reqwest::blocking::{Client, Response};
use serde::Deserialize;
use serde_json::json;

use super::retry::with_retry;
use super::types::{Issue, IssueState, LabelEntry, MergeResult, PullRequest, RepoLabel};
use super::GithubGateway;
use crate::error::{Error, Result};

const DEFAULT_BASE: &str = "https://api.github.com";
const PER_PAGE: usize = 100;

pub struct RestGateway {
    client: Client,
    base: String,
    token: String,
}

impl RestGateway {
    pub fn new(token: String) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("soba/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| Error::Unexpected(format!("http client init failed: {e}")))?;
        Ok(Self {
            client,
            base: DEFAULT_BASE.to_string(),
            token,
        })
    }

    /// Point the gateway at a different API root (test servers).
    pub fn with_base(mut self, base: &str) -> Self {
        self.base = base.trim_end_matches('/').to_string();
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }

    fn send(&self, build: impl Fn(&Client) -> reqwest::blocking::RequestBuilder) -> Result<Response> {
        let resp = build(&self.client)
            .header("Authorization", format!("Bearer {}", self.token))
            .header("Accept", "application/vnd.github+json")
            .send()?;
        classify(resp)
    }

    fn get_json<T: for<'de> Deserialize<'de>>(&self, path: &str) -> Result<T> {
        let url = self.url(path);
        with_retry(path, || {
            let resp = self.send(|c| c.get(&url))?;
            Ok(resp.json::<T>()?)
        })
    }

    /// Issues endpoint, all pages, PR rows dropped.
    fn list_issues(&self, repo: &str, state: &str) -> Result<Vec<Issue>> {
        let mut issues = Vec::new();
        let mut page = 1;
        loop {
            let path = format!(
                "/repos/{repo}/issues?state={state}&per_page={PER_PAGE}&page={page}"
            );
            let raw: Vec<RawIssue> = self.get_json(&path)?;
            let page_len = raw.len();
            issues.extend(
                raw.into_iter()
                    .filter(|i| i.pull_request.is_none())
                    .map(RawIssue::into_issue),
            );
            if page_len < PER_PAGE {
                return Ok(issues);
            }
            page += 1;
        }
    }

    /// Replace the full label set on an issue.
    fn set_labels(&self, repo: &str, issue: u64, labels: &[String]) -> Result<()> {
        let path = format!("/repos/{repo}/issues/{issue}/labels");
        let url = self.url(&path);
        with_retry(&path, || {
            self.send(|c| c.put(&url).json(&json!({ "labels": labels })))?;
            Ok(())
        })
    }

    fn get_issue_labels(&self, repo: &str, issue: u64) -> Result<Vec<String>> {
        let raw: RawIssue = self.get_json(&format!("/repos/{repo}/issues/{issue}"))?;
        Ok(raw.into_issue().labels)
    }
}

impl GithubGateway for RestGateway {
    fn list_open_issues(&self, repo: &str) -> Result<Vec<Issue>> {
        self.list_issues(repo, "open")
    }

    fn list_closed_issues(&self, repo: &str) -> Result<Vec<Issue>> {
        self.list_issues(repo, "closed")
    }

    fn list_labels(&self, repo: &str) -> Result<Vec<RepoLabel>> {
        self.get_json(&format!("/repos/{repo}/labels?per_page={PER_PAGE}"))
    }

    fn create_label(&self, repo: &str, name: &str, color: &str, description: &str) -> Result<()> {
        // Never retried: a validation failure means the label already
        // exists, which is the desired end state.
        let url = self.url(&format!("/repos/{repo}/labels"));
        let body = json!({ "name": name, "color": color, "description": description });
        match self.send(|c| c.post(&url).json(&body)) {
            Ok(_) => Ok(()),
            Err(Error::Api { status: 422, .. }) => Ok(()),
            Err(e) => Err(e),
        }
    }

    fn update_labels(&self, repo: &str, issue: u64, remove: &[&str], add: &[&str]) -> Result<()> {
        let current = self.get_issue_labels(repo, issue)?;
        let mut next: Vec<String> = current
            .into_iter()
            .filter(|l| !remove.contains(&l.as_str()))
            .collect();
        for l in add {
            if !next.iter().any(|n| n == l) {
                next.push((*l).to_string());
            }
        }
        self.set_labels(repo, issue, &next)
    }

    fn update_labels_with_check(
        &self,
        repo: &str,
        issue: u64,
        from: &str,
        to: &str,
    ) -> Result<bool> {
        let current = self.get_issue_labels(repo, issue)?;
        if !current.iter().any(|l| l == from) || current.iter().any(|l| l == to) {
            return Ok(false);
        }
        let mut next: Vec<String> = current.into_iter().filter(|l| l != from).collect();
        next.push(to.to_string());
        self.set_labels(repo, issue, &next)?;
        Ok(true)
    }

    fn search_prs_with_labels(&self, repo: &str, labels: &[&str]) -> Result<Vec<PullRequest>> {
        let filter = labels.join(",");
        let path = format!(
            "/repos/{repo}/issues?state=open&labels={filter}&per_page={PER_PAGE}"
        );
        let rows: Vec<RawIssue> = self.get_json(&path)?;
        let mut prs = Vec::new();
        for row in rows.into_iter().filter(|r| r.pull_request.is_some()) {
            prs.push(self.get_pr(repo, row.number)?);
        }
        Ok(prs)
    }

    fn get_pr(&self, repo: &str, number: u64) -> Result<PullRequest> {
        let raw: RawPull = self.get_json(&format!("/repos/{repo}/pulls/{number}"))?;
        Ok(raw.into_pull())
    }

    fn merge_pr(&self, repo: &str, number: u64) -> Result<MergeResult> {
        let url = self.url(&format!("/repos/{repo}/pulls/{number}/merge"));
        match self.send(|c| c.put(&url).json(&json!({ "merge_method": "squash" }))) {
            Ok(resp) => Ok(resp.json::<MergeResult>()?),
            // 405 (not mergeable) and 409 (head changed) both mean the PR
            // cannot be merged as-is.
            Err(Error::Api { status, message }) if status == 405 || status == 409 => {
                Err(Error::NotMergeable {
                    number,
                    reason: message,
                })
            }
            Err(e) => Err(e),
        }
    }

    fn close_issue_with_label(&self, repo: &str, number: u64, label: &str) -> Result<()> {
        let close_path = format!("/repos/{repo}/issues/{number}");
        let close_url = self.url(&close_path);
        with_retry(&close_path, || {
            self.send(|c| c.patch(&close_url).json(&json!({ "state": "closed" })))?;
            Ok(())
        })?;

        let label_path = format!("/repos/{repo}/issues/{number}/labels");
        let label_url = self.url(&label_path);
        with_retry(&label_path, || {
            self.send(|c| c.post(&label_url).json(&json!({ "labels": [label] })))?;
            Ok(())
        })
    }
}

/// Map an HTTP response into the error taxonomy.
fn classify(resp: Response) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let code = status.as_u16();
    if code == 401 {
        return Err(Error::Auth("github rejected the token (401)".into()));
    }

    // 403/429 with an exhausted quota is the rate limiter, not a plain
    // permission failure.
    if code == 403 || code == 429 {
        let remaining = header(&resp, "x-ratelimit-remaining");
        if remaining.as_deref() == Some("0") {
            let reset_epoch = header(&resp, "x-ratelimit-reset")
                .and_then(|v| v.parse().ok())
                .unwrap_or(0);
            return Err(Error::RateLimited { reset_epoch });
        }
    }

    let message = resp
        .text()
        .ok()
        .and_then(|body| {
            serde_json::from_str::<serde_json::Value>(&body)
                .ok()
                .and_then(|v| v["message"].as_str().map(str::to_string))
                .or(Some(body))
        })
        .unwrap_or_default();
    Err(Error::Api {
        status: code,
        message,
    })
}

fn header(resp: &Response, name: &str) -> Option<String> {
    resp.headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

// ── Wire structs ─────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct RawIssue {
    number: u64,
    #[serde(default)]
    title: String,
    #[serde(default)]
    state: String,
    #[serde(default)]
    labels: Vec<LabelEntry>,
    #[serde(default)]
    created_at: Option<String>,
    #[serde(default)]
    updated_at: Option<String>,
    /// Present when the issue row is actually a pull request.
    #[serde(default)]
    pull_request: Option<serde_json::Value>,
}

impl RawIssue {
    fn into_issue(self) -> Issue {
        Issue {
            number: self.number,
            title: self.title,
            state: if self.state == "closed" {
                IssueState::Closed
            } else {
                IssueState::Open
            },
            labels: self.labels.into_iter().map(LabelEntry::into_name).collect(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawPull {
    number: u64,
    #[serde(default)]
    title: String,
    #[serde(default)]
    body: Option<String>,
    #[serde(default)]
    state: String,
    #[serde(default)]
    mergeable: Option<bool>,
    #[serde(default)]
    mergeable_state: Option<String>,
    #[serde(default)]
    labels: Vec<LabelEntry>,
}

impl RawPull {
    fn into_pull(self) -> PullRequest {
        PullRequest {
            number: self.number,
            title: self.title,
            body: self.body.unwrap_or_default(),
            state: self.state,
            mergeable: self.mergeable,
            mergeable_state: self.mergeable_state,
            labels: self.labels.into_iter().map(LabelEntry::into_name).collect(),
        }
    }
}
