//! Scan orchestration and result aggregation core for drover.
//!
//! This crate implements the pipeline shared by every drover monitor:
//! a list of [`Target`]s is fanned out to a bounded worker pool
//! ([`dispatch`]), each worker invokes an external scanner binary
//! ([`ScanInvocation`]) and captures its output artifact, the
//! [`Aggregator`] normalizes the heterogeneous per-source findings into
//! canonical [`FindingEvent`]s, and the [`InsightsClient`] ships them to
//! the telemetry ingestion endpoint as one gzip-compressed batch.
//!
//! # Failure containment
//!
//! Failures affecting a single target (scanner exit code, missing or
//! unparsable artifact) are converted into a [`RunStatus`] variant, logged
//! at WARN, and never abort the rest of the run. Only configuration and
//! enumeration failures are fatal; those live in [`ConfigError`] and the
//! source crates.
//!
//! # Error Handling
//!
//! Library errors use [`thiserror`]; the CLI crate (`drover_cli`) wraps
//! them with `anyhow` context.

/// Result aggregation: artifact consumption, normalization, cleanup.
pub mod aggregate;
/// Settings structs built once from the environment.
pub mod config;
/// Bounded fan-out/fan-in dispatcher for scanner invocations.
pub mod dispatch;
/// Error types shared across the pipeline.
pub mod error;
/// False-positive substring filtering.
pub mod filter;
/// Raw scanner findings and the canonical telemetry event.
pub mod finding;
/// Scanner subprocess invocation and output artifacts.
pub mod invocation;
/// Common re-exports for internal use.
pub mod prelude;
/// Telemetry batching, compression, and delivery.
pub mod publish;
/// Random down-sampling of target lists.
pub mod sample;
/// Scan targets and their source tags.
pub mod target;

pub use aggregate::{AggregateOutput, Aggregator};
pub use config::{ConfigError, InsightsConfig, optional_env, require_env};
pub use dispatch::{BoxFuture, RunResult, RunStatus, ScanRunner, dispatch};
pub use error::DroverError;
pub use filter::FalsePositiveFilter;
pub use finding::{FileFinding, FindingEvent, GdriveFinding, GitFinding, JiraFinding, RawFinding};
pub use invocation::{Artifact, BinaryRunner, OutputMode, ScanInvocation, ScannerConfig};
pub use publish::{Delivery, InsightsClient, PublishError};
pub use sample::sample_targets;
pub use target::{SourceKind, Target};
