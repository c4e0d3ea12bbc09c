/* neira:meta
id: NEI-20260914-153000-service-probe
intent: feature
summary: Bounded HTTP reachability checks against declared services.
*/
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::ServiceTarget;
use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProbeKind {
    Service,
    Workload,
}

/// Outcome of one bounded check against one target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeResult {
    pub target: String,
    pub kind: ProbeKind,
    pub reachable: bool,
    /// Whether a failure of this target is critical (required service, critical workload).
    pub critical: bool,
    pub latency_ms: Option<u64>,
    pub error_detail: Option<String>,
}

impl ProbeResult {
    pub fn up(target: &str, kind: ProbeKind, critical: bool, latency: Option<Duration>) -> Self {
        Self {
            target: target.to_string(),
            kind,
            reachable: true,
            critical,
            latency_ms: latency.map(|l| l.as_millis() as u64),
            error_detail: None,
        }
    }

    pub fn down(target: &str, kind: ProbeKind, critical: bool, detail: impl Into<String>) -> Self {
        Self {
            target: target.to_string(),
            kind,
            reachable: false,
            critical,
            latency_ms: None,
            error_detail: Some(detail.into()),
        }
    }
}

/// Reachability checks against the declared HTTP services.
pub struct ServiceProber {
    client: reqwest::Client,
}

impl ServiceProber {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()?;
        Ok(Self { client })
    }

    /// Probe every target in declaration order. Failures are recorded in the
    /// result, never returned as errors.
    pub async fn probe_services(&self, targets: &[ServiceTarget]) -> Vec<ProbeResult> {
        let mut results = Vec::with_capacity(targets.len());
        for target in targets {
            results.push(self.probe(target).await);
        }
        results
    }

    async fn probe(&self, target: &ServiceTarget) -> ProbeResult {
        let started = Instant::now();
        match self.client.get(&target.url).send().await {
            Ok(resp) if resp.status().is_success() || resp.status().is_redirection() => {
                let latency = started.elapsed();
                debug!(service = %target.name, latency_ms = latency.as_millis() as u64, "service reachable");
                ProbeResult::up(&target.name, ProbeKind::Service, target.required, Some(latency))
            }
            Ok(resp) => ProbeResult::down(
                &target.name,
                ProbeKind::Service,
                target.required,
                format!("HTTP {}", resp.status().as_u16()),
            ),
            Err(e) if e.is_timeout() => ProbeResult::down(
                &target.name,
                ProbeKind::Service,
                target.required,
                format!("timed out after {}ms", started.elapsed().as_millis()),
            ),
            Err(e) => ProbeResult::down(
                &target.name,
                ProbeKind::Service,
                target.required,
                e.to_string(),
            ),
        }
    }
}
