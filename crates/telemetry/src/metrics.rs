//! Prometheus metrics.

use connector_hub_core::{Error, Result};
use metrics::Unit;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Install the Prometheus recorder and return the render handle.
pub fn setup_metrics_recorder() -> Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| Error::internal(format!("Failed to install Prometheus recorder: {}", e)))?;

    describe_metrics();
    tracing::info!("Prometheus metrics recorder initialized");
    Ok(handle)
}

/// Register descriptions for every metric the gateway and orchestrator emit.
pub fn describe_metrics() {
    metrics::describe_counter!(
        "connector_requests_total",
        "Backend calls by connector and outcome"
    );
    metrics::describe_histogram!(
        "connector_request_duration_seconds",
        Unit::Seconds,
        "Latency of backend calls including retries"
    );
    metrics::describe_counter!(
        "connector_cache_hits_total",
        "Requests answered from the response cache"
    );
    metrics::describe_counter!(
        "connector_rate_limited_total",
        "Requests rejected by the per-connector rate limit"
    );
    metrics::describe_counter!("pipeline_stages_total", "Pipeline stages by terminal status");
    metrics::describe_counter!("pipeline_runs_total", "Pipelines by terminal status");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_described_metrics_render() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        metrics::with_local_recorder(&recorder, || {
            describe_metrics();
            metrics::counter!("connector_requests_total", "connector" => "github", "outcome" => "success")
                .increment(2);
        });

        let rendered = handle.render();
        assert!(rendered.contains("# HELP connector_requests_total"));
        assert!(rendered.contains("connector_requests_total{connector=\"github\",outcome=\"success\"} 2"));
    }
}
