//! GitHub Enterprise enumeration and commit write-back.
//!
//! Walks every repository the token can see, keeps the ones with commits
//! inside the recency window, and emits one git target per changed repo.
//! After a scan, [`GheClient::comment_on_findings`] posts a commit comment
//! for findings whose reason is on the fixed allow-list, so authors hear
//! about high-confidence leaks directly.

use chrono::{DateTime, SecondsFormat, Utc};
use drover_core::finding::FindingEvent;
use drover_core::target::{SourceKind, Target};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::EnumerationError;

const PER_PAGE: usize = 100;

/// Finding reasons confident enough to warrant a comment on the offending
/// commit. Everything else still reaches telemetry but stays quiet in the
/// repository.
pub const COMMENT_WORTHY_REASONS: [&str; 19] = [
    "Amazon AWS Access Key ID",
    "Amazon MWS Auth Token",
    "Slack Token",
    "GitHub",
    "MailChimp API Key",
    "Mailgun API Key",
    "Slack Webhook",
    "New Relic Insights Key (specific)",
    "New Relic Insights Key (vague)",
    "New Relic License Key",
    "New Relic HTTP Auth Headers and API Key",
    "New Relic API Key Service Key (new format)",
    "New Relic APM License Key (new format)",
    "New Relic APM License Key (new format, region-aware)",
    "New Relic REST API Key (new format)",
    "New Relic Admin API Key (new format)",
    "New Relic Insights Insert Key (new format)",
    "New Relic Insights Query Key (new format)",
    "New Relic Synthetics Private Location Key (new format)",
];

/// Whether a finding reason is on the commit-comment allow-list.
#[must_use]
pub fn comment_worthy(reason: &str) -> bool {
    COMMENT_WORTHY_REASONS.contains(&reason)
}

/// Extracts `org/repo` from an SSH clone URL like
/// `git@ghe.example.com:org/repo.git`.
#[must_use]
pub fn repo_full_name(ssh_url: &str) -> Option<&str> {
    let (_, rest) = ssh_url.split_once(':')?;
    Some(rest.strip_suffix(".git").unwrap_or(rest))
}

/// One repository as returned by the GHE API.
#[derive(Debug, Clone, Deserialize)]
pub struct Repository {
    /// Numeric id, used as the pagination cursor.
    pub id: u64,
    /// `org/repo`.
    pub full_name: String,
    /// SSH clone URL; absent on some mirror repositories.
    #[serde(default)]
    pub ssh_url: Option<String>,
    /// Web URL, the base for trace-back links.
    pub html_url: String,
}

#[derive(Debug, Clone, Deserialize)]
struct CommitRecord {
    sha: String,
    #[serde(default)]
    author: Option<CommitAuthor>,
}

#[derive(Debug, Clone, Deserialize)]
struct CommitAuthor {
    login: String,
}

/// Client for a GitHub Enterprise `/api/v3` endpoint.
#[derive(Debug)]
pub struct GheClient {
    client: reqwest::Client,
    api_base: String,
    token: String,
}

impl GheClient {
    /// Creates a client for the given API base URL
    /// (`https://<GHE_DOMAIN>/api/v3`) and personal access token.
    pub fn new(api_base: impl Into<String>, token: impl Into<String>) -> Result<Self, EnumerationError> {
        Ok(Self {
            client: crate::http_client()?,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            token: token.into(),
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, EnumerationError> {
        let response = self
            .client
            .get(format!("{}{path}", self.api_base))
            .header("Authorization", format!("token {}", self.token))
            .query(query)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(EnumerationError::Api {
                service: "GitHub",
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }
        Ok(response.json().await?)
    }

    /// Lists every repository on the instance, following the id cursor until
    /// a page comes back empty.
    pub async fn all_repositories(&self) -> Result<Vec<Repository>, EnumerationError> {
        let mut repos: Vec<Repository> = Vec::new();
        let mut cursor = 0u64;
        loop {
            let page: Vec<Repository> = self
                .get_json(
                    "/repositories",
                    &[("per_page", PER_PAGE.to_string()), ("since", cursor.to_string())],
                )
                .await?;
            let Some(last) = page.last() else { break };
            cursor = last.id;
            repos.extend(page);
        }
        info!(repos = repos.len(), "enumerated instance repositories");
        Ok(repos)
    }

    /// Lists every repository belonging to one organization, page by page.
    pub async fn org_repositories(&self, org: &str) -> Result<Vec<Repository>, EnumerationError> {
        let mut repos: Vec<Repository> = Vec::new();
        let mut page = 1u32;
        loop {
            let batch: Vec<Repository> = self
                .get_json(
                    &format!("/orgs/{org}/repos"),
                    &[
                        ("type", "all".to_string()),
                        ("per_page", PER_PAGE.to_string()),
                        ("page", page.to_string()),
                    ],
                )
                .await?;
            let done = batch.len() < PER_PAGE;
            repos.extend(batch);
            if done {
                break;
            }
            page += 1;
        }
        info!(org, repos = repos.len(), "enumerated organization repositories");
        Ok(repos)
    }

    /// Fetches one repository by `org/repo` name.
    pub async fn repository(&self, full_name: &str) -> Result<Repository, EnumerationError> {
        self.get_json(&format!("/repos/{full_name}"), &[]).await
    }

    async fn commits_since(
        &self,
        full_name: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<CommitRecord>, EnumerationError> {
        let since = since.to_rfc3339_opts(SecondsFormat::Secs, true);
        let mut commits: Vec<CommitRecord> = Vec::new();
        let mut page = 1u32;
        loop {
            let batch: Vec<CommitRecord> = self
                .get_json(
                    &format!("/repos/{full_name}/commits"),
                    &[
                        ("since", since.clone()),
                        ("per_page", PER_PAGE.to_string()),
                        ("page", page.to_string()),
                    ],
                )
                .await?;
            let done = batch.len() < PER_PAGE;
            commits.extend(batch);
            if done {
                break;
            }
            page += 1;
        }
        Ok(commits)
    }

    /// Enumerates every repository with commits since the cutoff, producing
    /// one git target per changed repo. The target's cursor is the oldest
    /// in-window commit so the scanner covers the whole window.
    ///
    /// Per-repo API failures (archived repos, permission gaps) are logged at
    /// DEBUG and skipped; only instance-level enumeration failure is fatal.
    pub async fn enumerate_changed_repos(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<Target>, EnumerationError> {
        let repos = self.all_repositories().await?;
        Ok(self.targets_from_repos(&repos, since).await)
    }

    /// Like [`enumerate_changed_repos`](Self::enumerate_changed_repos) but
    /// restricted to one organization's repositories.
    pub async fn enumerate_org_repos(
        &self,
        org: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<Target>, EnumerationError> {
        let repos = self.org_repositories(org).await?;
        Ok(self.targets_from_repos(&repos, since).await)
    }

    /// Like [`enumerate_changed_repos`](Self::enumerate_changed_repos) but
    /// for a single named repository. Used to re-scan a known-bad repo.
    pub async fn enumerate_single_repo(
        &self,
        full_name: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<Target>, EnumerationError> {
        let repo = self.repository(full_name).await?;
        Ok(self.targets_from_repos(std::slice::from_ref(&repo), since).await)
    }

    async fn targets_from_repos(&self, repos: &[Repository], since: DateTime<Utc>) -> Vec<Target> {
        let mut targets = Vec::new();
        for repo in repos {
            let commits = match self.commits_since(&repo.full_name, since).await {
                Ok(commits) => commits,
                Err(e) => {
                    debug!(repo = %repo.full_name, error = %e, "skipping repo: commit listing failed");
                    continue;
                }
            };
            // Commits come newest-first; the last one is the window start.
            let Some(oldest) = commits.last() else {
                debug!(repo = %repo.full_name, "skipping repo: no commits in window");
                continue;
            };
            let Some(ssh_url) = repo.ssh_url.as_deref() else {
                debug!(repo = %repo.full_name, "skipping repo: no SSH URL");
                continue;
            };
            targets.push(
                Target::new(SourceKind::GitRepo, ssh_url)
                    .with_link(repo.html_url.as_str())
                    .with_since_commit(oldest.sha.as_str()),
            );
        }
        info!(targets = targets.len(), "repositories with in-window commits");
        targets
    }

    /// Posts a commit comment for every comment-worthy event. Returns how
    /// many comments were created; individual failures are logged and
    /// skipped so commentary can never block the run.
    pub async fn comment_on_findings(&self, events: &[FindingEvent]) -> usize {
        let mut posted = 0;
        for event in events.iter().filter(|e| comment_worthy(&e.reason)) {
            let Some(full_name) = repo_full_name(&event.source_locator) else {
                warn!(locator = %event.source_locator, "cannot derive repo name for comment");
                continue;
            };
            let Some(sha) = event.context.get("commitHash").and_then(Value::as_str) else {
                continue;
            };
            match self.post_commit_comment(full_name, sha, event).await {
                Ok(()) => posted += 1,
                Err(e) => {
                    warn!(repo = full_name, sha, error = %e, "failed to comment on commit");
                }
            }
        }
        posted
    }

    async fn post_commit_comment(
        &self,
        full_name: &str,
        sha: &str,
        event: &FindingEvent,
    ) -> Result<(), EnumerationError> {
        let commit: CommitRecord = self.get_json(&format!("/repos/{full_name}/commits/{sha}"), &[]).await?;
        let greeting = match commit.author {
            Some(author) => format!("Hi @{} !", author.login),
            None => "Hi!".to_string(),
        };
        let path = event.path.as_deref().unwrap_or_default();
        let line = event.context.get("new_line_num").and_then(Value::as_u64).unwrap_or(0);
        let body = format!(
            "{greeting} It looks like a secret {} was posted in the file {path} on line {line} \
             in this commit. We're trying to reduce sensitive information in GitHub Enterprise \
             by scanning all commits going forward.",
            event.reason
        );

        let response = self
            .client
            .post(format!("{}/repos/{full_name}/commits/{sha}/comments", self.api_base))
            .header("Authorization", format!("token {}", self.token))
            .json(&json!({ "body": body }))
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(EnumerationError::Api {
                service: "GitHub",
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }
        debug!(repo = full_name, sha, "created commit comment");
        Ok(())
    }
}
