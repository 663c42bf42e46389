use thiserror::Error;

/// Top-level error type for the drover pipeline.
///
/// Unifies the fatal error kinds — configuration and delivery — for callers
/// that orchestrate a full run. Per-target failures never surface here;
/// they are contained as [`RunStatus`](crate::dispatch::RunStatus)
/// variants.
#[derive(Debug, Error)]
pub enum DroverError {
    /// Required configuration is missing or invalid.
    #[error(transparent)]
    Config(#[from] crate::config::ConfigError),

    /// The telemetry batch could not be built or sent.
    #[error(transparent)]
    Publish(#[from] crate::publish::PublishError),
}
