//! Jira enumeration: recently updated issues and the Google Doc links
//! they reference.
//!
//! One Jira pass feeds two scanners: every matched issue becomes a
//! [`SourceKind::JiraIssue`] target for the issue scanner, and every Google
//! Doc link found in a description or comment becomes a
//! [`SourceKind::GoogleDoc`] target keyed back to the issue that leaked it.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use drover_core::target::{SourceKind, Target};
use regex::Regex;
use serde::Deserialize;
use tracing::{debug, info};

use crate::EnumerationError;

/// Default search window: issues touched since the start of today.
pub const DEFAULT_JQL: &str = "updatedDate >= startOfDay()";

static GDOC_LINK_RE: LazyLock<Regex> = LazyLock::new(|| {
    #[expect(clippy::unwrap_used, reason = "static regex is known-valid at compile time")]
    Regex::new(r"(?i)https://docs\.google\.com/[^\s|\]]+").unwrap()
});

static GDOC_ID_RE: LazyLock<Regex> = LazyLock::new(|| {
    #[expect(clippy::unwrap_used, reason = "static regex is known-valid at compile time")]
    Regex::new(r"(?i)https://docs\.google\.com/\w+/d/([a-zA-Z0-9-_]+)").unwrap()
});

/// Extracts Google Doc ids from free-form text. Links without a `/d/<id>`
/// segment (for example search URLs) are ignored.
#[must_use]
pub fn extract_doc_ids(text: &str) -> Vec<String> {
    GDOC_LINK_RE
        .find_iter(text)
        .filter_map(|link| GDOC_ID_RE.captures(link.as_str()))
        .filter_map(|captures| captures.get(1))
        .map(|id| id.as_str().to_string())
        .collect()
}

/// One issue from the search API, trimmed to what enumeration needs.
#[derive(Debug, Clone, Deserialize)]
pub struct Issue {
    /// Issue key, e.g. `OPS-1234`.
    pub key: String,
    /// Selected fields.
    pub fields: IssueFields,
}

/// Issue fields used for doc-link extraction.
#[derive(Debug, Clone, Deserialize)]
pub struct IssueFields {
    /// Free-form description; absent or null on many issues.
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchPage {
    total: usize,
    #[serde(rename = "maxResults")]
    max_results: usize,
    issues: Vec<Issue>,
}

#[derive(Debug, Deserialize)]
struct CommentPage {
    #[serde(default)]
    comments: Vec<Comment>,
}

#[derive(Debug, Deserialize)]
struct Comment {
    body: String,
}

/// Basic-auth client for a Jira server's REST API.
#[derive(Debug)]
pub struct JiraClient {
    client: reqwest::Client,
    base_url: String,
    username: String,
    password: String,
}

impl JiraClient {
    /// Creates a client for the Jira instance at `base_url`.
    pub fn new(
        base_url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Result<Self, EnumerationError> {
        Ok(Self {
            client: crate::http_client()?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            username: username.into(),
            password: password.into(),
        })
    }

    /// The instance base URL, as passed to the issue scanner.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, EnumerationError> {
        let response = self
            .client
            .get(format!("{}{path}", self.base_url))
            .basic_auth(&self.username, Some(&self.password))
            .query(query)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(EnumerationError::Api {
                service: "Jira",
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }
        Ok(response.json().await?)
    }

    /// Runs the JQL search, following `startAt` pagination until every
    /// matching issue has been collected.
    pub async fn search_issues(&self, jql: &str) -> Result<Vec<Issue>, EnumerationError> {
        let mut issues: Vec<Issue> = Vec::new();
        loop {
            let page: SearchPage = self
                .get_json(
                    "/rest/api/2/search",
                    &[("jql", jql.to_string()), ("startAt", issues.len().to_string())],
                )
                .await?;
            if page.issues.is_empty() || page.max_results == 0 {
                break;
            }
            debug!(
                fetched = issues.len() + page.issues.len(),
                total = page.total,
                "retrieved search page"
            );
            issues.extend(page.issues);
            if issues.len() >= page.total {
                break;
            }
        }
        info!(issues = issues.len(), jql, "search complete");
        Ok(issues)
    }

    async fn issue_comments(&self, key: &str) -> Result<Vec<String>, EnumerationError> {
        let page: CommentPage = self.get_json(&format!("/rest/api/2/issue/{key}/comment"), &[]).await?;
        Ok(page.comments.into_iter().map(|c| c.body).collect())
    }

    /// Scans descriptions and comments of the given issues for Google Doc
    /// links and returns one doc target per (issue, doc) pair, each carrying
    /// the issue key as `jira_key` context.
    pub async fn doc_targets(&self, issues: &[Issue]) -> Result<Vec<Target>, EnumerationError> {
        let mut targets = Vec::new();
        for issue in issues {
            let mut doc_ids: BTreeSet<String> = BTreeSet::new();
            if let Some(description) = issue.fields.description.as_deref() {
                doc_ids.extend(extract_doc_ids(description));
            }
            for body in self.issue_comments(&issue.key).await? {
                doc_ids.extend(extract_doc_ids(&body));
            }
            for doc_id in doc_ids {
                targets.push(
                    Target::new(SourceKind::GoogleDoc, doc_id).with_context("jira_key", issue.key.as_str()),
                );
            }
        }
        info!(targets = targets.len(), "issues referencing Google Docs");
        Ok(targets)
    }
}

/// One issue-scanner target per issue.
#[must_use]
pub fn issue_targets(issues: &[Issue]) -> Vec<Target> {
    issues
        .iter()
        .map(|issue| Target::new(SourceKind::JiraIssue, issue.key.as_str()))
        .collect()
}
