use std::collections::BTreeMap;

/// Which source collaborator a target came from.
///
/// The kind decides two things downstream: how the scanner command line is
/// assembled, and which JSON finding shape the aggregator expects in the
/// output artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    /// A git repository scanned commit-by-commit (choctaw-style scanner).
    GitRepo,
    /// A Google Drive native document (ankamali-style scanner).
    GoogleDoc,
    /// A Jira issue scanned via the issue API (gottingen-style scanner).
    JiraIssue,
    /// A downloaded file or archive scanned on disk (duroc-style scanner).
    Archive,
}

/// One unit of scan work.
///
/// Produced by an enumerator, consumed exactly once by the dispatcher.
/// Immutable after construction: the dispatcher and aggregator key their
/// results on the whole value, so two distinct targets must never compare
/// equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Target {
    /// Source tag controlling invocation and finding shape.
    pub kind: SourceKind,
    /// What the scanner is pointed at: an SSH URL, a document id, an issue
    /// key, or a file URL.
    pub locator: Box<str>,
    /// Human-facing base link (repo `html_url`, document web link) used when
    /// deriving trace-back URLs for events.
    pub link: Option<Box<str>>,
    /// Scan from this commit forward; git targets only.
    pub since_commit: Option<Box<str>>,
    /// Extra key/values copied into every event produced from this target
    /// (issue key, package version, listing name, ...).
    pub context: BTreeMap<Box<str>, String>,
}

impl Target {
    /// Creates a target with no link, cursor, or extra context.
    #[must_use]
    pub fn new(kind: SourceKind, locator: impl Into<Box<str>>) -> Self {
        Self {
            kind,
            locator: locator.into(),
            link: None,
            since_commit: None,
            context: BTreeMap::new(),
        }
    }

    /// Sets the trace-back base link.
    #[must_use]
    pub fn with_link(mut self, link: impl Into<Box<str>>) -> Self {
        self.link = Some(link.into());
        self
    }

    /// Sets the since-commit cursor for git targets.
    #[must_use]
    pub fn with_since_commit(mut self, sha: impl Into<Box<str>>) -> Self {
        self.since_commit = Some(sha.into());
        self
    }

    /// Adds one context key/value carried into emitted events.
    #[must_use]
    pub fn with_context(mut self, key: impl Into<Box<str>>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_sets_fields() {
        let target = Target::new(SourceKind::GitRepo, "git@ghe.example:org/repo.git")
            .with_link("https://ghe.example/org/repo")
            .with_since_commit("abc123")
            .with_context("team", "platform");

        assert_eq!(target.kind, SourceKind::GitRepo);
        assert_eq!(&*target.locator, "git@ghe.example:org/repo.git");
        assert_eq!(target.link.as_deref(), Some("https://ghe.example/org/repo"));
        assert_eq!(target.since_commit.as_deref(), Some("abc123"));
        assert_eq!(target.context.get("team").map(String::as_str), Some("platform"));
    }

    #[test]
    fn targets_with_different_locators_are_distinct() {
        let a = Target::new(SourceKind::Archive, "https://example.com/a.tar.gz");
        let b = Target::new(SourceKind::Archive, "https://example.com/b.tar.gz");
        assert_ne!(a, b);
    }
}
