use std::collections::BTreeMap;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::dispatch::{RunResult, RunStatus};
use crate::finding::{FindingEvent, GitFinding, RawFinding};
use crate::invocation::Artifact;
use crate::target::Target;

/// Converts per-target scan results into canonical telemetry events.
///
/// One aggregation pass covers one monitor variant: a single source kind and
/// a single event type. Failed targets contribute zero events and a WARN log
/// line; they never fail the pass. File artifacts are deleted after
/// consumption on every path, success or failure, so repeated runs cannot
/// exhaust the temp directory.
#[derive(Debug, Clone)]
pub struct Aggregator {
    event_type: Box<str>,
}

/// Events plus the final resolution of every dispatched target.
#[derive(Debug)]
pub struct AggregateOutput {
    /// Canonical events, ready for publishing.
    pub events: Vec<FindingEvent>,
    /// Exactly one entry per input result; failures keep their refined
    /// status (`ArtifactMissing`, `ParseFailure`) for reporting.
    pub resolutions: Vec<(Target, RunStatus)>,
}

impl AggregateOutput {
    /// Number of targets that produced a consumable findings array.
    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.resolutions
            .iter()
            .filter(|(_, status)| *status == RunStatus::Success)
            .count()
    }

    /// Number of targets that failed at any stage.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.resolutions.len() - self.succeeded()
    }
}

impl Aggregator {
    /// Creates an aggregator emitting events of the given type.
    #[must_use]
    pub fn new(event_type: impl Into<Box<str>>) -> Self {
        Self {
            event_type: event_type.into(),
        }
    }

    /// Consumes every run result, normalizing findings and cleaning up
    /// artifacts. Order-independent: results are keyed by the target they
    /// carry, not by position.
    #[must_use]
    pub fn aggregate(&self, results: Vec<RunResult>) -> AggregateOutput {
        let mut events = Vec::new();
        let mut resolutions = Vec::with_capacity(results.len());

        for result in results {
            let (status, mut target_events) = self.consume(&result);
            if let RunStatus::InvocationFailure { exit_code, stderr } = &status {
                warn!(
                    locator = %result.target.locator,
                    exit_code = ?exit_code,
                    stderr = %stderr,
                    "scanner failed for target"
                );
            }
            cleanup(&result.artifact);
            events.append(&mut target_events);
            resolutions.push((result.target, status));
        }

        info!(
            events = events.len(),
            targets = resolutions.len(),
            "aggregation complete"
        );
        AggregateOutput { events, resolutions }
    }

    /// Reads and normalizes one result. Returns the refined status and the
    /// events it produced; never errors.
    fn consume(&self, result: &RunResult) -> (RunStatus, Vec<FindingEvent>) {
        if result.status != RunStatus::Success {
            return (result.status.clone(), Vec::new());
        }

        let bytes = match &result.artifact {
            Artifact::Buffer(bytes) => bytes.clone(),
            Artifact::File(path) => match std::fs::read(path) {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!(locator = %result.target.locator, path = %path.display(), error = %e,
                        "findings artifact missing or unreadable");
                    return (RunStatus::ArtifactMissing, Vec::new());
                }
            },
        };

        let raw = match result.target.kind.parse_findings(&bytes) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(locator = %result.target.locator, error = %e, "findings artifact is not valid JSON");
                return (RunStatus::ParseFailure, Vec::new());
            }
        };

        debug!(locator = %result.target.locator, findings = raw.len(), "normalizing findings");
        let events = raw
            .iter()
            .map(|finding| self.normalize(&result.target, finding))
            .collect();
        (RunStatus::Success, events)
    }

    /// The fixed per-source mapping from raw finding fields to event keys.
    fn normalize(&self, target: &Target, raw: &RawFinding) -> FindingEvent {
        let mut context: BTreeMap<Box<str>, Value> = target
            .context
            .iter()
            .map(|(k, v)| (k.clone(), Value::from(v.as_str())))
            .collect();

        let (reason, path) = match raw {
            RawFinding::Git(finding) => {
                let base = target.link.as_deref().unwrap_or_default();
                context.insert("commitHash".into(), Value::from(finding.commit_hash.as_str()));
                context.insert(
                    "parent_commitHash".into(),
                    Value::from(finding.parent_commit_hash.as_str()),
                );
                context.insert("old_line_num".into(), Value::from(finding.old_line_num));
                context.insert("new_line_num".into(), Value::from(finding.new_line_num));
                context.insert(
                    "url".into(),
                    Value::from(format!("{base}/commit/{}/{}", finding.commit_hash, finding.path)),
                );
                context.insert("fileurl".into(), Value::from(file_url(base, finding)));
                (finding.reason.as_str(), Some(finding.path.as_str()))
            }
            RawFinding::GoogleDoc(finding) => {
                context.insert("g_drive_id".into(), Value::from(finding.g_drive_id.as_str()));
                context.insert("url".into(), Value::from(finding.web_link.as_str()));
                let path = (!finding.path.is_empty()).then_some(finding.path.as_str());
                (finding.reason.as_str(), path)
            }
            RawFinding::Jira(finding) => {
                context.insert("issue_id".into(), Value::from(finding.issue_id.as_str()));
                context.insert("url".into(), Value::from(finding.url.as_str()));
                context.insert("location".into(), Value::from(finding.location.as_str()));
                (finding.reason.as_str(), None)
            }
            RawFinding::File(finding) => {
                if finding.linenum != 0 {
                    context.insert("linenum".into(), Value::from(finding.linenum));
                }
                if let Some(link) = target.link.as_deref() {
                    context.insert("url".into(), Value::from(link));
                }
                (finding.reason.as_str(), Some(finding.path.as_str()))
            }
        };

        FindingEvent {
            event_type: self.event_type.clone(),
            reason: reason.into(),
            source_locator: target.locator.clone(),
            path: path.map(Into::into),
            context,
        }
    }
}

/// Derives the blob URL for a git finding.
///
/// Diff-hunk results for deletions have no line on the new side
/// (`new_line_num == 0`); those are addressed through the parent commit and
/// the old line number instead.
#[must_use]
pub fn file_url(base: &str, finding: &GitFinding) -> String {
    if finding.new_line_num != 0 {
        format!(
            "{base}/blob/{}/{}#L{}",
            finding.commit_hash, finding.path, finding.new_line_num
        )
    } else {
        format!(
            "{base}/blob/{}/{}#L{}",
            finding.parent_commit_hash, finding.path, finding.old_line_num
        )
    }
}

/// Removes a file artifact. Missing files are fine (the scanner may never
/// have created one); anything else is logged and otherwise ignored.
fn cleanup(artifact: &Artifact) {
    let Artifact::File(path) = artifact else { return };
    match std::fs::remove_file(path) {
        Ok(()) => debug!(path = %path.display(), "removed findings artifact"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "failed to remove findings artifact"),
    }
}
