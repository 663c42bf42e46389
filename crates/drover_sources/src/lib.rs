//! Source collaborators for the drover pipeline.
//!
//! Each module wraps one external system and turns its inventory into
//! [`Target`](drover_core::Target)s for the dispatcher:
//!
//! - [`github`] — GitHub Enterprise repositories with recent commits, plus
//!   the commit-comment write-back for confirmed findings.
//! - [`jira`] — recently updated Jira issues and the Google Doc links they
//!   reference.
//! - [`gdrive`] — Google Drive file listings routed by MIME type.
//! - [`packages`] — latest published PyPI sdists and RubyGems gems.
//! - [`weblisting`] — S3 bucket XML listings and HTML directory listings
//!   driven by a JSON config file.
//! - [`download`] — fetch-to-temp helper and the download-then-scan runner.
//!
//! Enumeration failures are hard errors: a run that cannot see its source's
//! inventory has nothing meaningful to report, so the caller aborts rather
//! than publishing a silently partial batch. Per-target scan failures are
//! handled downstream by the dispatcher and never surface here.

pub mod download;
pub mod gdrive;
pub mod github;
pub mod jira;
pub mod packages;
pub mod weblisting;

/// User agent sent on every enumeration request.
pub const USER_AGENT: &str = concat!("drover/", env!("CARGO_PKG_VERSION"));

/// Errors raised while enumerating targets from a source.
#[derive(Debug, thiserror::Error)]
pub enum EnumerationError {
    /// The HTTP client could not be initialised.
    #[error("failed to initialize HTTP client: {0}")]
    ClientInit(String),

    /// A request to the source's API failed at the transport level.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The source's API answered with a non-success status.
    #[error("{service} API returned {status}: {body}")]
    Api {
        /// Which collaborator rejected the request.
        service: &'static str,
        /// HTTP status code of the response.
        status: u16,
        /// Response body, for the diagnostic.
        body: String,
    },

    /// The source's response could not be interpreted.
    #[error("malformed {service} response: {message}")]
    Malformed {
        /// Which collaborator produced the response.
        service: &'static str,
        /// What was wrong with it.
        message: String,
    },

    /// A listing config file could not be read or parsed.
    #[error("failed to load listing config from {path}: {message}")]
    Config {
        /// Path of the config file.
        path: String,
        /// Read or parse failure detail.
        message: String,
    },
}

pub(crate) fn http_client() -> Result<reqwest::Client, EnumerationError> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(std::time::Duration::from_secs(30))
        .build()
        .map_err(|e| EnumerationError::ClientInit(e.to_string()))
}
