//! Diagnostic latency probe.
//!
//! After a slow run, two well-known endpoints are timed concurrently and the
//! faster one is recommended. A failed round-trip still counts: its elapsed
//! time is reported as the latency. The probe never fails the run; only a
//! crash of the probe task itself yields no result.

use crate::error::ProbeError;
use crate::models::{ProbeResult, Resolver, RunRecord};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Whether any page load in `record` was strictly slower than `threshold_ms`.
pub fn should_probe(record: &RunRecord, threshold_ms: f64) -> bool {
    record
        .measurements
        .iter()
        .any(|m| m.load_time > threshold_ms)
}

/// Something a round-trip can be timed against.
#[async_trait]
pub trait ProbeEndpoint: Send + Sync {
    /// Display label, e.g. "Cloudflare".
    fn label(&self) -> &str;

    /// Perform one round-trip.
    async fn round_trip(&self) -> Result<(), ProbeError>;
}

/// HTTP GET against a fixed URL.
#[derive(Debug, Clone)]
pub struct HttpEndpoint {
    label: String,
    url: String,
    client: reqwest::Client,
}

impl HttpEndpoint {
    pub fn new(label: impl Into<String>, url: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            label: label.into(),
            url: url.into(),
            client,
        }
    }
}

#[async_trait]
impl ProbeEndpoint for HttpEndpoint {
    fn label(&self) -> &str {
        &self.label
    }

    async fn round_trip(&self) -> Result<(), ProbeError> {
        let response = self
            .client
            .get(&self.url)
            .header("accept", "application/dns-json")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProbeError::Status(status.as_u16()));
        }
        response.bytes().await?;
        Ok(())
    }
}

/// Time one round-trip, whether or not it succeeds.
async fn timed(endpoint: &dyn ProbeEndpoint) -> f64 {
    let start = Instant::now();
    let outcome = endpoint.round_trip().await;
    let elapsed = start.elapsed().as_secs_f64() * 1000.0;

    match outcome {
        Ok(()) => debug!("{} answered in {:.1}ms", endpoint.label(), elapsed),
        Err(e) => debug!(
            "{} failed after {:.1}ms, keeping elapsed time: {}",
            endpoint.label(),
            elapsed,
            e
        ),
    }

    elapsed
}

/// Times two endpoints against each other.
#[derive(Clone)]
pub struct DiagnosticProbe {
    a: Arc<dyn ProbeEndpoint>,
    b: Arc<dyn ProbeEndpoint>,
}

impl DiagnosticProbe {
    pub fn new(a: Arc<dyn ProbeEndpoint>, b: Arc<dyn ProbeEndpoint>) -> Self {
        Self { a, b }
    }

    /// Build from configured endpoints.
    pub fn http(config: &crate::config::ProbeConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;

        Ok(Self::new(
            Arc::new(HttpEndpoint::new(
                config.label_a.clone(),
                config.url_a.clone(),
                client.clone(),
            )),
            Arc::new(HttpEndpoint::new(
                config.label_b.clone(),
                config.url_b.clone(),
                client,
            )),
        ))
    }

    /// Label of the endpoint behind a recommendation.
    pub fn label(&self, resolver: Resolver) -> &str {
        match resolver {
            Resolver::A => self.a.label(),
            Resolver::B => self.b.label(),
        }
    }

    /// Time both endpoints concurrently.
    pub async fn measure(&self) -> ProbeResult {
        let (latency_a, latency_b) =
            futures::future::join(timed(self.a.as_ref()), timed(self.b.as_ref())).await;
        ProbeResult::from_latencies(latency_a, latency_b)
    }

    /// Run the probe in its own task. `None` if that task dies.
    pub async fn run(&self) -> Option<ProbeResult> {
        let probe = self.clone();
        match tokio::spawn(async move { probe.measure().await }).await {
            Ok(result) => Some(result),
            Err(e) => {
                warn!("Diagnostic probe aborted: {}", e);
                None
            }
        }
    }
}
