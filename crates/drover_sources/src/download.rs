//! Download-then-scan support for archive targets.
//!
//! Package registries, bucket listings, and Drive binaries all address
//! content by URL; the file scanner wants a local path. [`FetchRunner`]
//! bridges the two: fetch the target's URL into the temp directory, run the
//! scanner over the downloaded file, then remove it. Download failures are
//! contained as invocation failures so one dead link cannot abort a batch.

use std::path::PathBuf;

use drover_core::dispatch::{BoxFuture, RunStatus, ScanRunner};
use drover_core::invocation::{Artifact, BinaryRunner};
use drover_core::target::Target;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::EnumerationError;

/// Unauthenticated client for public artifact downloads.
pub fn download_client() -> Result<reqwest::Client, EnumerationError> {
    crate::http_client()
}

/// Derives a download filename from the final URL path segment.
/// Query strings and fragments are dropped first.
#[must_use]
pub fn file_name_from_url(url: &str) -> String {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let name = path.trim_end_matches('/').rsplit('/').next().unwrap_or("");
    if name.is_empty() { "download".to_string() } else { name.to_string() }
}

/// Fetches `url` into the temp directory under a UUID-prefixed name and
/// returns the path. The prefix keeps concurrent downloads of identically
/// named artifacts from clobbering each other.
pub async fn fetch_to_temp(
    client: &reqwest::Client,
    url: &str,
    file_name: &str,
) -> Result<PathBuf, EnumerationError> {
    let response = client.get(url).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(EnumerationError::Api {
            service: "download",
            status: status.as_u16(),
            body: response.text().await.unwrap_or_default(),
        });
    }
    let bytes = response.bytes().await?;

    let safe_name = file_name.replace(['/', '\\'], "_");
    let path = std::env::temp_dir().join(format!("{}-{safe_name}", Uuid::new_v4()));
    tokio::fs::write(&path, &bytes).await.map_err(|e| EnumerationError::Malformed {
        service: "download",
        message: format!("failed to write {}: {e}", path.display()),
    })?;
    debug!(url, path = %path.display(), bytes = bytes.len(), "downloaded scan subject");
    Ok(path)
}

/// Scan runner for URL-addressed targets: download, scan the local file,
/// delete it.
#[derive(Debug)]
pub struct FetchRunner {
    client: reqwest::Client,
    scanner: BinaryRunner,
}

impl FetchRunner {
    /// Pairs a download client with a file scanner. Pass an authorized
    /// client when the URLs need credentials (Drive media downloads).
    #[must_use]
    pub const fn new(client: reqwest::Client, scanner: BinaryRunner) -> Self {
        Self { client, scanner }
    }
}

impl ScanRunner for FetchRunner {
    fn scan<'a>(&'a self, target: &'a Target) -> BoxFuture<'a, (RunStatus, Artifact)> {
        Box::pin(async move {
            let name = target
                .context
                .get("filename")
                .cloned()
                .unwrap_or_else(|| file_name_from_url(&target.locator));

            let path = match fetch_to_temp(&self.client, &target.locator, &name).await {
                Ok(path) => path,
                Err(e) => {
                    let status = RunStatus::InvocationFailure {
                        exit_code: None,
                        stderr: format!("download failed: {e}").into(),
                    };
                    return (status, Artifact::Buffer(Vec::new()));
                }
            };

            let result = self.scanner.scan_path(&path).await;
            if let Err(e) = tokio::fs::remove_file(&path).await {
                warn!(path = %path.display(), error = %e, "failed to remove downloaded file");
            }
            result
        })
    }
}

#[cfg(test)]
#[expect(
    clippy::expect_used,
    clippy::panic,
    reason = "tests use expect and panic for clearer failure messages"
)]
mod tests {
    use drover_core::invocation::{OutputMode, ScannerConfig};
    use drover_core::target::SourceKind;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    #[test]
    fn file_names_come_from_the_url_path() {
        assert_eq!(file_name_from_url("https://files.example/a/agent-1.0.tar.gz"), "agent-1.0.tar.gz");
        assert_eq!(file_name_from_url("https://files.example/agent.gem?dl=1#top"), "agent.gem");
        assert_eq!(file_name_from_url("https://files.example/"), "download");
    }

    #[tokio::test]
    async fn fetch_writes_the_response_body_to_a_temp_file() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/agent.tar.gz"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"archive bytes".to_vec()))
            .mount(&server)
            .await;

        let client = reqwest::Client::new();
        let url = format!("{}/agent.tar.gz", server.uri());
        let downloaded = fetch_to_temp(&client, &url, "agent.tar.gz").await.expect("fetch succeeds");

        let content = std::fs::read(&downloaded).expect("downloaded file reads");
        assert_eq!(content, b"archive bytes");
        std::fs::remove_file(&downloaded).expect("cleanup");
    }

    #[tokio::test]
    async fn fetch_runner_scans_the_downloaded_file_and_removes_it() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/agent.gem"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"gem".to_vec()))
            .expect(1)
            .mount(&server)
            .await;

        // Stub scanner: emit an empty findings array, fail if the subject
        // file is missing.
        let config = ScannerConfig::new("sh", OutputMode::Stdout)
            .with_args(["-c", r#"test -f "$0" && printf '[]'"#]);
        let runner = FetchRunner::new(reqwest::Client::new(), BinaryRunner::new(config));

        let target = Target::new(SourceKind::Archive, format!("{}/agent.gem", server.uri()))
            .with_context("filename", "agent.gem");
        let (status, artifact) = runner.scan(&target).await;

        assert_eq!(status, RunStatus::Success);
        assert_eq!(artifact, Artifact::Buffer(b"[]".to_vec()));
    }

    #[tokio::test]
    async fn dead_links_become_invocation_failures() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let config = ScannerConfig::new("sh", OutputMode::Stdout).with_args(["-c", "printf '[]'"]);
        let runner = FetchRunner::new(reqwest::Client::new(), BinaryRunner::new(config));

        let target = Target::new(SourceKind::Archive, format!("{}/gone.tar.gz", server.uri()));
        let (status, _artifact) = runner.scan(&target).await;

        let RunStatus::InvocationFailure { exit_code, stderr } = status else {
            panic!("expected a contained failure, got {status:?}");
        };
        assert_eq!(exit_code, None);
        assert!(stderr.contains("download failed"));
    }
}
