use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::target::SourceKind;

/// One record from a git-history scanner (choctaw-style).
///
/// Field names mirror the scanner's JSON output exactly. Diff-hunk results
/// carry both sides of the hunk: a deletion has `new_line_num == 0` and is
/// only addressable through the parent commit.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GitFinding {
    /// Which detection rule fired.
    pub reason: String,
    /// Path of the offending file within the repository.
    pub path: String,
    /// Commit that introduced the diff hunk.
    #[serde(rename = "commitHash")]
    pub commit_hash: String,
    /// Parent commit of the hunk.
    pub parent_commit_hash: String,
    /// Line number on the old side of the hunk, 0 when absent.
    pub old_line_num: u64,
    /// Line number on the new side of the hunk, 0 for deletions.
    pub new_line_num: u64,
    /// The matched strings.
    #[serde(rename = "stringsFound", default)]
    pub strings_found: Vec<String>,
    /// Commit message, when the scanner includes it.
    #[serde(default)]
    pub commit: String,
    /// Commit date, when the scanner includes it.
    #[serde(default)]
    pub date: String,
}

/// One record from a Google Drive document scanner (ankamali-style).
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GdriveFinding {
    /// Which detection rule fired.
    pub reason: String,
    /// Drive document id.
    pub g_drive_id: String,
    /// Shareable link to the document.
    pub web_link: String,
    /// Location within the document, when reported.
    #[serde(default)]
    pub path: String,
    /// Modification date, when reported.
    #[serde(default)]
    pub date: String,
    /// The matched strings.
    #[serde(rename = "stringsFound", default)]
    pub strings_found: Vec<String>,
}

/// One record from a Jira issue scanner (gottingen-style).
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct JiraFinding {
    /// Which detection rule fired.
    pub reason: String,
    /// Issue key the finding was located in.
    pub issue_id: String,
    /// Link to the issue.
    pub url: String,
    /// Where in the issue the match sits (description, comment, ...).
    pub location: String,
    /// The matched strings.
    #[serde(rename = "stringsFound", default)]
    pub strings_found: Vec<String>,
}

/// One record from a file/archive scanner (duroc-style).
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FileFinding {
    /// Which detection rule fired.
    pub reason: String,
    /// Path within the scanned file or archive.
    pub path: String,
    /// Line number, 0 for binary content.
    #[serde(default)]
    pub linenum: u64,
    /// The matched strings.
    #[serde(rename = "stringsFound", default)]
    pub strings_found: Vec<String>,
}

/// A scanner finding tagged by the source that produced it.
///
/// The orchestrator always knows which scanner it ran, so artifacts are
/// parsed into the matching variant instead of punning on dynamic JSON.
#[derive(Debug, Clone, PartialEq)]
pub enum RawFinding {
    /// Git-history finding.
    Git(GitFinding),
    /// Google Drive document finding.
    GoogleDoc(GdriveFinding),
    /// Jira issue finding.
    Jira(JiraFinding),
    /// File or archive finding.
    File(FileFinding),
}

impl SourceKind {
    /// Parses an artifact's bytes as this source's findings array.
    ///
    /// An empty array is valid and yields no findings.
    pub fn parse_findings(self, bytes: &[u8]) -> Result<Vec<RawFinding>, serde_json::Error> {
        Ok(match self {
            Self::GitRepo => serde_json::from_slice::<Vec<GitFinding>>(bytes)?
                .into_iter()
                .map(RawFinding::Git)
                .collect(),
            Self::GoogleDoc => serde_json::from_slice::<Vec<GdriveFinding>>(bytes)?
                .into_iter()
                .map(RawFinding::GoogleDoc)
                .collect(),
            Self::JiraIssue => serde_json::from_slice::<Vec<JiraFinding>>(bytes)?
                .into_iter()
                .map(RawFinding::Jira)
                .collect(),
            Self::Archive => serde_json::from_slice::<Vec<FileFinding>>(bytes)?
                .into_iter()
                .map(RawFinding::File)
                .collect(),
        })
    }
}

/// Canonical telemetry record derived from one raw finding.
///
/// Every event carries enough context to trace back to the exact offending
/// artifact: the source locator plus per-source keys (commit hash and file
/// URL, document link, issue key, package version). The timestamp is
/// implicit — the ingestion endpoint stamps events at receipt.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FindingEvent {
    /// Event type name, one per monitor variant.
    #[serde(rename = "eventType")]
    pub event_type: Box<str>,
    /// Which detection rule fired.
    pub reason: Box<str>,
    /// The target's source locator.
    #[serde(rename = "sourceLocator")]
    pub source_locator: Box<str>,
    /// Path of the offending content, when the source has one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<Box<str>>,
    /// Source-specific trace-back keys, flattened into the event object.
    #[serde(flatten)]
    pub context: BTreeMap<Box<str>, serde_json::Value>,
}

#[cfg(test)]
#[expect(clippy::expect_used, clippy::panic, reason = "tests use expect/panic for clearer failure messages")]
mod tests {
    use super::*;

    #[test]
    fn git_findings_deserialize_from_scanner_output() {
        let json = r#"[{
            "reason": "Slack Token",
            "path": "config/prod.yml",
            "commitHash": "def456",
            "parent_commit_hash": "abc123",
            "old_line_num": 10,
            "new_line_num": 12,
            "stringsFound": ["xoxb-1234"],
            "commit": "add prod config",
            "date": "2020-03-01"
        }]"#;

        let findings = SourceKind::GitRepo
            .parse_findings(json.as_bytes())
            .expect("valid scanner output");
        let [RawFinding::Git(finding)] = findings.as_slice() else {
            panic!("expected one git finding");
        };
        assert_eq!(finding.commit_hash, "def456");
        assert_eq!(finding.new_line_num, 12);
        assert_eq!(finding.strings_found, ["xoxb-1234"]);
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let json = r#"[{"reason": "Entropy", "path": "a.bin", "linenum": 0, "futureField": true}]"#;
        let findings = SourceKind::Archive
            .parse_findings(json.as_bytes())
            .expect("unknown fields must not break parsing");
        assert_eq!(findings.len(), 1);
    }

    #[test]
    fn empty_array_is_valid_for_every_kind() {
        for kind in [
            SourceKind::GitRepo,
            SourceKind::GoogleDoc,
            SourceKind::JiraIssue,
            SourceKind::Archive,
        ] {
            assert!(kind.parse_findings(b"[]").expect("empty array is valid").is_empty());
        }
    }

    #[test]
    fn non_array_artifact_is_a_parse_error() {
        assert!(SourceKind::JiraIssue.parse_findings(b"{\"oops\": 1}").is_err());
        assert!(SourceKind::GitRepo.parse_findings(b"not json").is_err());
    }

    #[test]
    fn event_serializes_with_flattened_context() {
        let mut context = BTreeMap::new();
        context.insert("jira_key".into(), serde_json::Value::from("OPS-1"));

        let event = FindingEvent {
            event_type: "jira_secret_monitor".into(),
            reason: "Slack Token".into(),
            source_locator: "OPS-1".into(),
            path: None,
            context,
        };

        let value = serde_json::to_value(&event).expect("event serializes");
        assert_eq!(value["eventType"], "jira_secret_monitor");
        assert_eq!(value["jira_key"], "OPS-1");
        assert!(value.get("path").is_none());
    }

    #[test]
    fn parse_findings_is_deterministic() {
        let json = r#"[{"reason": "AWS Key", "path": "lib/x.rb", "linenum": 3}]"#;
        let a = SourceKind::Archive.parse_findings(json.as_bytes()).expect("parses");
        let b = SourceKind::Archive.parse_findings(json.as_bytes()).expect("parses");
        assert_eq!(a, b);
    }
}
