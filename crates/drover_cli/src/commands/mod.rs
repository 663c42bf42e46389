//! One module per monitor variant, plus the pipeline shared between them.

pub mod gdrive;
pub mod ghe;
pub mod jira;
pub mod listing;
pub mod packages;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use drover_core::prelude::*;
use tracing::info;

use crate::RunArgs;

/// Single-threaded runtime for one command's pipeline. The heavy lifting
/// happens in scanner subprocesses, not on the executor.
pub(crate) fn runtime() -> anyhow::Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| anyhow::anyhow!("failed to create async runtime: {e}"))
}

/// Builds a scanner config from its path environment variable and the
/// shared timeout flag.
pub(crate) fn scanner_config(
    path_var: &'static str,
    output: OutputMode,
    run: &RunArgs,
) -> anyhow::Result<ScannerConfig> {
    let binary = require_env(path_var)?;
    Ok(ScannerConfig::new(binary, output).with_timeout(Duration::from_secs(run.timeout)))
}

/// The shared back half of every monitor variant: sample, dispatch,
/// aggregate, optionally filter, publish. Returns the published events so
/// callers with side effects (commit comments) can act on them after the
/// batch is safely out.
pub(crate) async fn scan_and_publish(
    event_type: &str,
    targets: Vec<Target>,
    runner: Arc<dyn ScanRunner>,
    insights: &InsightsConfig,
    run: &RunArgs,
) -> anyhow::Result<Vec<FindingEvent>> {
    let targets = match run.sample {
        Some(n) => sample_targets(targets, n),
        None => targets,
    };
    info!(event_type, targets = targets.len(), "dispatching scan");

    let results = dispatch(targets, run.concurrency, runner).await;
    let output = Aggregator::new(event_type).aggregate(results);
    info!(
        event_type,
        succeeded = output.succeeded(),
        failed = output.failed(),
        events = output.events.len(),
        "scan pass complete"
    );

    let mut events = output.events;
    if run.filter_false_positives {
        let filter = FalsePositiveFilter::builtin().context("failed to build false-positive filter")?;
        let removed = filter.retain(&mut events);
        info!(event_type, removed, "dropped false positives");
    }

    let delivery = InsightsClient::new(insights)?.publish(&events).await?;
    info!(event_type, status = delivery.status, events = delivery.event_count, "batch submitted");
    Ok(events)
}
