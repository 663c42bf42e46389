//! The `drover jira` command: two scan passes over recently updated issues.
//!
//! Pass one sends every Google Doc linked from an issue to the doc scanner;
//! pass two sends every issue itself to the issue scanner. Each pass
//! publishes its own batch under its own event type, so a failure in the
//! second pass cannot take the first pass's findings with it.

use std::sync::Arc;

use drover_core::prelude::*;
use drover_sources::jira::{self, DEFAULT_JQL, JiraClient};

use crate::JiraArgs;
use crate::commands::{runtime, scan_and_publish, scanner_config};

/// Searches Jira, then runs the doc pass and the issue pass.
pub fn run(args: &JiraArgs) -> anyhow::Result<()> {
    let insights = InsightsConfig::from_env()?;
    let url = require_env("JIRA_URL")?;
    let username = require_env("JIRA_USERNAME")?;
    let password = require_env("JIRA_PASSWORD")?;

    let ankamali = scanner_config("ANKAMALI_HOG_PATH", OutputMode::OutputFile, &args.run)?;
    let gottingen = scanner_config("GOTTINGEN_HOG_PATH", OutputMode::OutputFile, &args.run)?.with_args([
        "--username".to_string(),
        username.clone(),
        "--password".to_string(),
        password.clone(),
        "--url".to_string(),
        url.clone(),
    ]);

    runtime()?.block_on(async {
        let client = JiraClient::new(url.as_str(), username.as_str(), password.as_str())?;
        let jql = args.jql.as_deref().unwrap_or(DEFAULT_JQL);
        let issues = client.search_issues(jql).await?;

        let doc_targets = client.doc_targets(&issues).await?;
        scan_and_publish(
            "gdrive_secret_monitor",
            doc_targets,
            Arc::new(BinaryRunner::new(ankamali)),
            &insights,
            &args.run,
        )
        .await?;

        scan_and_publish(
            "jira_secret_monitor",
            jira::issue_targets(&issues),
            Arc::new(BinaryRunner::new(gottingen)),
            &insights,
            &args.run,
        )
        .await?;
        Ok(())
    })
}
