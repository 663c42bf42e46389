//! The `drover ghe` command: nightly sweep of a GitHub Enterprise instance.

use std::sync::Arc;

use chrono::Utc;
use drover_core::prelude::*;
use drover_sources::github::GheClient;
use tracing::info;

use crate::GheArgs;
use crate::commands::{runtime, scan_and_publish, scanner_config};

/// Enumerates changed repositories, scans them, publishes, then comments.
pub fn run(args: &GheArgs) -> anyhow::Result<()> {
    let insights = InsightsConfig::from_env()?;
    let domain = require_env("GHE_DOMAIN")?;
    let token = require_env("GHE_REPO_TOKEN")?;
    let ssh_key = require_env("SSH_KEY_PATH")?;
    let scanner = scanner_config("CHOCTAW_HOG_PATH", OutputMode::OutputFile, &args.run)?
        .with_args(["--sshkeypath".to_string(), ssh_key]);

    runtime()?.block_on(async {
        let client = GheClient::new(format!("https://{domain}/api/v3"), token)?;
        let since = Utc::now() - chrono::Duration::hours(args.since_hours);

        let targets = match (args.knownbad.as_deref(), args.org.as_deref()) {
            (Some(repo), _) => client.enumerate_single_repo(repo, since).await?,
            (None, Some(org)) => client.enumerate_org_repos(org, since).await?,
            (None, None) => client.enumerate_changed_repos(since).await?,
        };

        let runner = Arc::new(BinaryRunner::new(scanner));
        let events =
            scan_and_publish("ghe_secret_monitor", targets, runner, &insights, &args.run).await?;

        // Telemetry is already out; commentary failures can only cost comments.
        let posted = client.comment_on_findings(&events).await;
        info!(posted, "commit comments created");
        Ok(())
    })
}
