//! Domain types for GitHub issues and pull requests.
//!
//! The REST layer normalizes label entries at the boundary: the API returns
//! either bare strings or `{name, color, ...}` records depending on the
//! endpoint, and downstream code only ever sees plain names.

use serde::Deserialize;

/// A label entry as GitHub serializes it. Normalized to a plain name via
/// [`LabelEntry::into_name`] before leaving the gateway.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum LabelEntry {
    Name(String),
    Record {
        name: String,
        #[serde(default)]
        color: Option<String>,
    },
}

impl LabelEntry {
    pub fn into_name(self) -> String {
        match self {
            LabelEntry::Name(n) => n,
            LabelEntry::Record { name, .. } => name,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueState {
    Open,
    Closed,
}

#[derive(Debug, Clone)]
pub struct Issue {
    pub number: u64,
    pub title: String,
    pub state: IssueState,
    /// Label names in API insertion order.
    pub labels: Vec<String>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

impl Issue {
    pub fn has_label(&self, name: &str) -> bool {
        self.labels.iter().any(|l| l == name)
    }
}

/// A repository label as returned by the labels endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct RepoLabel {
    pub name: String,
    #[serde(default)]
    pub color: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PullRequest {
    pub number: u64,
    pub title: String,
    pub body: String,
    pub state: String,
    /// None while GitHub is still computing mergeability.
    pub mergeable: Option<bool>,
    /// `clean`, `dirty`, `blocked`, `unstable`, `behind`, `unknown`.
    pub mergeable_state: Option<String>,
    pub labels: Vec<String>,
}

impl PullRequest {
    pub fn has_label(&self, name: &str) -> bool {
        self.labels.iter().any(|l| l == name)
    }
}

/// Result of a squash merge.
#[derive(Debug, Clone, Deserialize)]
pub struct MergeResult {
    #[serde(default)]
    pub sha: Option<String>,
    #[serde(default)]
    pub merged: bool,
    #[serde(default)]
    pub message: String,
}
