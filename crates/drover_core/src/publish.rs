use std::io::Write as _;
use std::time::Duration;

use flate2::Compression;
use flate2::write::GzEncoder;
use tracing::{info, warn};

use crate::config::InsightsConfig;
use crate::finding::FindingEvent;

/// Production ingestion endpoint base URL.
pub const DEFAULT_COLLECTOR_URL: &str = "https://insights-collector.newrelic.com";

const PUBLISH_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors raised while delivering a telemetry batch.
///
/// A non-2xx response is not an error — the status is reported in
/// [`Delivery`] and logged; delivery is at-most-once per run and the nightly
/// schedule is the retry mechanism.
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    /// The HTTP client could not be initialised.
    #[error("failed to initialize HTTP client: {0}")]
    ClientInit(String),

    /// The event batch could not be serialized.
    #[error("failed to serialize events: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Gzip compression of the payload failed.
    #[error("failed to compress payload: {0}")]
    Compress(#[source] std::io::Error),

    /// The POST itself failed (connection refused, DNS, timeout).
    #[error("telemetry POST failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// Outcome of one publish attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delivery {
    /// HTTP status code returned by the collector.
    pub status: u16,
    /// How many events were in the batch.
    pub event_count: usize,
}

impl Delivery {
    /// Whether the collector accepted the batch.
    #[must_use]
    pub const fn accepted(&self) -> bool {
        self.status >= 200 && self.status < 300
    }
}

/// Batching telemetry publisher for the ingestion endpoint.
///
/// The whole run's events go out as one gzip-compressed JSON array —
/// batching per run, not per finding, keeps network overhead flat no matter
/// how many findings a scan produces.
#[derive(Debug)]
pub struct InsightsClient {
    client: reqwest::Client,
    events_url: String,
    insert_key: String,
}

impl InsightsClient {
    /// Builds a publisher from connection settings.
    pub fn new(config: &InsightsConfig) -> Result<Self, PublishError> {
        let client = reqwest::Client::builder()
            .timeout(PUBLISH_TIMEOUT)
            .build()
            .map_err(|e| PublishError::ClientInit(e.to_string()))?;

        let base = config.collector_url.trim_end_matches('/');
        Ok(Self {
            client,
            events_url: format!("{base}/v1/accounts/{}/events", config.account_id),
            insert_key: config.insert_key.clone(),
        })
    }

    /// Serializes, compresses, and POSTs the batch; inspects only the
    /// response status code. Non-2xx is logged and reported, not retried.
    pub async fn publish(&self, events: &[FindingEvent]) -> Result<Delivery, PublishError> {
        let json = serde_json::to_vec(events)?;
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&json).map_err(PublishError::Compress)?;
        let body = encoder.finish().map_err(PublishError::Compress)?;

        info!(events = events.len(), compressed_bytes = body.len(), "submitting batch to collector");

        let response = self
            .client
            .post(&self.events_url)
            .header("Content-Type", "application/json")
            .header("X-Insert-Key", &self.insert_key)
            .header("Content-Encoding", "gzip")
            .body(body)
            .send()
            .await?;

        let delivery = Delivery {
            status: response.status().as_u16(),
            event_count: events.len(),
        };
        if delivery.accepted() {
            info!(status = delivery.status, "collector accepted batch");
        } else {
            warn!(status = delivery.status, "collector rejected batch; not retrying");
        }
        Ok(delivery)
    }
}
