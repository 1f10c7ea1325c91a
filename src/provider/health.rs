//! Readiness polling against a started instance.

use std::time::Duration;

use crate::error::SandboxError;
use crate::provider::types::{HealthCheckConfig, InstanceAddress, ProbeMethod};

const PROBE_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Poll the instance's health route until it answers 2xx or `timeout`
/// elapses.
///
/// A config without both an endpoint and a port has nothing to probe;
/// that is treated as ready (with a warning) so images lacking a health
/// route still come up. The first probe fires immediately; the elapsed
/// check happens after each failed probe, so a deadline of K intervals
/// allows K+1 probes.
pub async fn wait_until_ready(
    http: &reqwest::Client,
    health: &HealthCheckConfig,
    address: &InstanceAddress,
    timeout: Duration,
) -> Result<(), SandboxError> {
    let (endpoint, port) = match (&health.endpoint, health.port) {
        (Some(endpoint), Some(port)) => (endpoint, port),
        _ => {
            tracing::warn!("no health check configured, assuming instance is ready");
            return Ok(());
        }
    };
    let host_port = address
        .ports
        .host_port(port)
        .ok_or(SandboxError::NotStarted)?;
    let url = format!(
        "http://{}:{}/{}",
        address.host,
        host_port,
        endpoint.trim_start_matches('/')
    );

    let started = tokio::time::Instant::now();
    loop {
        match probe(http, health, &url).await {
            Ok(status) if status.is_success() => {
                tracing::info!(%url, elapsed = ?started.elapsed(), "instance is ready");
                return Ok(());
            }
            Ok(status) => {
                tracing::debug!(%url, %status, "health check not ready");
            }
            Err(e) => {
                tracing::debug!(%url, error = %e, "health check unreachable");
            }
        }
        if started.elapsed() >= timeout {
            return Err(SandboxError::ReadinessTimeout { timeout });
        }
        tokio::time::sleep(health.interval).await;
    }
}

async fn probe(
    http: &reqwest::Client,
    health: &HealthCheckConfig,
    url: &str,
) -> Result<reqwest::StatusCode, reqwest::Error> {
    let mut request = match health.method {
        ProbeMethod::Get => http.get(url),
        ProbeMethod::Post => http.post(url),
    };
    request = request.timeout(PROBE_REQUEST_TIMEOUT);
    for (name, value) in &health.headers {
        request = request.header(name, value);
    }
    if let Some(body) = &health.body {
        request = request.json(body);
    }
    Ok(request.send().await?.status())
}
