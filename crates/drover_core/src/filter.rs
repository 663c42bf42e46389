use aho_corasick::AhoCorasick;

use crate::finding::FindingEvent;

/// Substrings that mark a finding as a known false positive.
///
/// Curated from years of scanner output: placeholder credentials, vendored
/// test fixtures, and documentation examples.
pub const DEFAULT_FP_WORDS: &[&str] = &[
    "foo",
    "bar",
    "example",
    "test",
    "host.com",
    "user:pass",
    "git@github",
    "DO_NOT_USE",
    "0000000000",
    "local_development",
    "bootstrap",
    "local_production",
    "username@hostname",
    "1234567890",
    "fitzgen@github.com",
    "user@domain.com",
    "admin:admin123",
    "templates",
    "you-must-create",
    "username:password",
    "123456789",
    "abcdefghij",
    "XXXXXXXXXX",
    "YOUR_GITLAB_TOKEN",
];

/// Case-insensitive multi-substring filter for known false positives.
///
/// An event is dropped when any of its string fields — reason, path,
/// locator, or a context value — contains one of the listed words.
#[derive(Debug)]
pub struct FalsePositiveFilter {
    matcher: AhoCorasick,
}

impl FalsePositiveFilter {
    /// Builds a filter over a custom word list.
    pub fn from_words<I, S>(words: I) -> Result<Self, aho_corasick::BuildError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<[u8]>,
    {
        let matcher = AhoCorasick::builder().ascii_case_insensitive(true).build(words)?;
        Ok(Self { matcher })
    }

    /// Builds a filter over [`DEFAULT_FP_WORDS`].
    pub fn builtin() -> Result<Self, aho_corasick::BuildError> {
        Self::from_words(DEFAULT_FP_WORDS)
    }

    /// Whether any string field of the event matches the word list.
    #[must_use]
    pub fn is_false_positive(&self, event: &FindingEvent) -> bool {
        if self.matches(&event.reason) || self.matches(&event.source_locator) {
            return true;
        }
        if event.path.as_deref().is_some_and(|p| self.matches(p)) {
            return true;
        }
        event
            .context
            .values()
            .filter_map(serde_json::Value::as_str)
            .any(|v| self.matches(v))
    }

    /// Drops false positives in place, returning how many were removed.
    pub fn retain(&self, events: &mut Vec<FindingEvent>) -> usize {
        let before = events.len();
        events.retain(|event| !self.is_false_positive(event));
        before - events.len()
    }

    fn matches(&self, text: &str) -> bool {
        self.matcher.is_match(text)
    }
}
