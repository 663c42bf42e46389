//! Convenience re-exports of the most commonly used types.

pub use crate::aggregate::{AggregateOutput, Aggregator};
pub use crate::config::{ConfigError, InsightsConfig, optional_env, require_env};
pub use crate::dispatch::{BoxFuture, RunResult, RunStatus, ScanRunner, dispatch};
pub use crate::error::DroverError;
pub use crate::filter::FalsePositiveFilter;
pub use crate::finding::{FindingEvent, RawFinding};
pub use crate::invocation::{Artifact, BinaryRunner, OutputMode, ScanInvocation, ScannerConfig};
pub use crate::publish::{Delivery, InsightsClient, PublishError};
pub use crate::sample::sample_targets;
pub use crate::target::{SourceKind, Target};
