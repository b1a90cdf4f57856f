//! Request statistics and Prometheus metrics of the gateway.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

/// Snapshot returned by `ConnectorGateway::stats`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayStats {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub cache_hits: u64,
    pub rate_limited: u64,
    /// Exponential moving average of backend latency, milliseconds.
    pub average_response_time_ms: f64,
}

/// Live counters behind [`GatewayStats`].
#[derive(Debug, Default)]
pub(crate) struct StatsRecorder {
    total: AtomicU64,
    success: AtomicU64,
    failed: AtomicU64,
    cache_hits: AtomicU64,
    rate_limited: AtomicU64,
    avg_ms: Mutex<Option<f64>>,
}

impl StatsRecorder {
    pub(crate) fn record_cache_hit(&self, connector: &str) {
        self.total.fetch_add(1, Ordering::Relaxed);
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("connector_cache_hits_total", "connector" => connector.to_string())
            .increment(1);
    }

    pub(crate) fn record_rate_limited(&self, connector: &str) {
        self.total.fetch_add(1, Ordering::Relaxed);
        self.failed.fetch_add(1, Ordering::Relaxed);
        self.rate_limited.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("connector_rate_limited_total", "connector" => connector.to_string())
            .increment(1);
    }

    pub(crate) fn record_outcome(&self, connector: &str, success: bool, latency: Duration) {
        self.total.fetch_add(1, Ordering::Relaxed);
        let outcome = if success {
            self.success.fetch_add(1, Ordering::Relaxed);
            "success"
        } else {
            self.failed.fetch_add(1, Ordering::Relaxed);
            "error"
        };

        let sample = latency.as_secs_f64() * 1_000.0;
        let mut avg = self.avg_ms.lock().unwrap_or_else(PoisonError::into_inner);
        *avg = Some(match *avg {
            Some(prev) => prev * 0.9 + sample * 0.1,
            None => sample,
        });

        metrics::counter!(
            "connector_requests_total",
            "connector" => connector.to_string(),
            "outcome" => outcome
        )
        .increment(1);
        metrics::histogram!(
            "connector_request_duration_seconds",
            "connector" => connector.to_string()
        )
        .record(latency.as_secs_f64());
    }

    pub(crate) fn snapshot(&self) -> GatewayStats {
        GatewayStats {
            total_requests: self.total.load(Ordering::Relaxed),
            successful_requests: self.success.load(Ordering::Relaxed),
            failed_requests: self.failed.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            rate_limited: self.rate_limited.load(Ordering::Relaxed),
            average_response_time_ms: self
                .avg_ms
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .unwrap_or(0.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_moving_average() {
        let stats = StatsRecorder::default();
        stats.record_outcome("a", true, Duration::from_millis(100));
        stats.record_outcome("a", false, Duration::from_millis(200));

        let snap = stats.snapshot();
        assert_eq!(snap.total_requests, 2);
        assert_eq!(snap.successful_requests, 1);
        assert_eq!(snap.failed_requests, 1);
        assert!((snap.average_response_time_ms - 110.0).abs() < 1e-6);
    }

    #[test]
    fn test_cache_hits_and_rate_limits_count_as_requests() {
        let stats = StatsRecorder::default();
        stats.record_cache_hit("a");
        stats.record_rate_limited("a");

        let snap = stats.snapshot();
        assert_eq!(snap.total_requests, 2);
        assert_eq!(snap.cache_hits, 1);
        assert_eq!(snap.rate_limited, 1);
        assert_eq!(snap.average_response_time_ms, 0.0);
    }
}
