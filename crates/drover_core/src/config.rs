use thiserror::Error;

/// Errors raised while assembling settings from the environment.
///
/// Missing credentials abort the whole run before any target is scanned,
/// so the message must name the exact variable the operator has to set.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required environment variable is unset or not valid UTF-8.
    #[error("missing required environment variable: {0}")]
    MissingVar(&'static str),

    /// A variable is present but its value cannot be used.
    #[error("invalid value for {name}: {message}")]
    Invalid {
        /// The offending environment variable.
        name: &'static str,
        /// Why the value was rejected.
        message: String,
    },
}

/// Reads a required environment variable, failing with its name.
pub fn require_env(name: &'static str) -> Result<String, ConfigError> {
    std::env::var(name).map_err(|_| ConfigError::MissingVar(name))
}

/// Reads an optional environment variable, treating unset and empty alike.
#[must_use]
pub fn optional_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

/// Connection settings for the telemetry ingestion endpoint.
///
/// Built once at process start and passed by reference into the publisher;
/// there is no ambient global configuration.
#[derive(Debug, Clone)]
pub struct InsightsConfig {
    /// Base URL of the collector, without the per-account path.
    pub collector_url: String,
    /// Destination account identifier.
    pub account_id: String,
    /// Value of the `X-Insert-Key` auth header.
    pub insert_key: String,
}

impl InsightsConfig {
    /// Builds the config from `INSIGHTS_INSERT_KEY`, `INSIGHTS_ACCT_ID`, and
    /// the optional `INSIGHTS_COLLECTOR_URL` override.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            collector_url: optional_env("INSIGHTS_COLLECTOR_URL")
                .unwrap_or_else(|| crate::publish::DEFAULT_COLLECTOR_URL.to_string()),
            account_id: require_env("INSIGHTS_ACCT_ID")?,
            insert_key: require_env("INSIGHTS_INSERT_KEY")?,
        })
    }
}

#[cfg(test)]
#[expect(clippy::expect_used, reason = "tests use expect for clearer failure messages")]
mod tests {
    use super::*;

    #[test]
    fn require_env_names_the_missing_variable() {
        let err = require_env("DROVER_TEST_VARIABLE_THAT_IS_NEVER_SET").expect_err("must be unset");
        assert!(err.to_string().contains("DROVER_TEST_VARIABLE_THAT_IS_NEVER_SET"));
    }

    #[test]
    fn require_env_reads_present_variables() {
        // PATH is always set in test environments.
        let value = require_env("PATH").expect("PATH should be set");
        assert!(!value.is_empty());
    }

    #[test]
    fn optional_env_is_none_when_unset() {
        assert!(optional_env("DROVER_TEST_VARIABLE_THAT_IS_NEVER_SET").is_none());
    }
}
