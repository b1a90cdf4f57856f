//! Per-connector sliding-window rate limiter.

use dashmap::DashMap;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;

use connector_hub_core::{Error, Result};

/// Admission timestamps of one connector, oldest first.
#[derive(Debug)]
struct RateLimitWindow {
    timestamps: VecDeque<Instant>,
    limit: u32,
}

impl RateLimitWindow {
    fn new(limit: u32) -> Self {
        Self {
            timestamps: VecDeque::new(),
            limit,
        }
    }

    /// Drop timestamps that left the window. Returns how many were dropped.
    fn prune(&mut self, now: Instant, window: Duration) -> usize {
        let mut removed = 0;
        while let Some(oldest) = self.timestamps.front() {
            if now.saturating_duration_since(*oldest) >= window {
                self.timestamps.pop_front();
                removed += 1;
            } else {
                break;
            }
        }
        removed
    }

    fn count(&self, now: Instant, window: Duration) -> usize {
        self.timestamps
            .iter()
            .filter(|t| now.saturating_duration_since(**t) < window)
            .count()
    }
}

/// Sliding-window limiter shared by every connector of a gateway.
#[derive(Debug, Default)]
pub struct RateLimiter {
    windows: DashMap<String, RateLimitWindow>,
}

impl RateLimiter {
    /// Create a limiter with no windows.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create (or reset) the window of `connector`.
    pub fn register(&self, connector: &str, limit: u32) {
        self.windows
            .insert(connector.to_string(), RateLimitWindow::new(limit));
    }

    /// Forget `connector`.
    pub fn remove(&self, connector: &str) {
        self.windows.remove(connector);
    }

    /// Change the quota of `connector`, keeping its recorded admissions.
    pub fn set_limit(&self, connector: &str, limit: u32) {
        if let Some(mut w) = self.windows.get_mut(connector) {
            w.limit = limit;
        }
    }

    /// Configured quota of `connector`.
    pub fn limit(&self, connector: &str) -> Option<u32> {
        self.windows.get(connector).map(|w| w.limit)
    }

    /// Requests admitted inside the trailing window.
    pub fn count(&self, connector: &str, window: Duration) -> usize {
        let now = Instant::now();
        self.windows
            .get(connector)
            .map(|w| w.count(now, window))
            .unwrap_or(0)
    }

    /// Fail with `RateLimitExceeded` when the quota is used up. Records nothing.
    pub fn check(&self, connector: &str, window: Duration) -> Result<()> {
        let now = Instant::now();
        match self.windows.get(connector) {
            Some(w) if w.count(now, window) >= w.limit as usize => {
                Err(exceeded(connector, w.limit, window))
            }
            _ => Ok(()),
        }
    }

    /// Re-check and record an admission in one step.
    ///
    /// Holding the window's shard lock across both keeps concurrent callers
    /// from overshooting the quota.
    pub fn admit(&self, connector: &str, window: Duration) -> Result<()> {
        let now = Instant::now();
        let Some(mut w) = self.windows.get_mut(connector) else {
            return Err(Error::not_found(connector));
        };
        w.prune(now, window);
        if w.timestamps.len() >= w.limit as usize {
            return Err(exceeded(connector, w.limit, window));
        }
        w.timestamps.push_back(now);
        Ok(())
    }

    /// Prune stale timestamps of every connector. Returns the total dropped.
    pub fn prune_all(&self, window: Duration) -> usize {
        let now = Instant::now();
        self.windows
            .iter_mut()
            .map(|mut w| w.prune(now, window))
            .sum()
    }

    /// Timestamps physically held for `connector`, stale ones included.
    pub fn stored(&self, connector: &str) -> usize {
        self.windows
            .get(connector)
            .map(|w| w.timestamps.len())
            .unwrap_or(0)
    }
}

fn exceeded(connector: &str, limit: u32, window: Duration) -> Error {
    Error::RateLimitExceeded {
        connector: connector.to_string(),
        limit,
        window_ms: window.as_millis() as u64,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_secs(60);

    #[tokio::test(start_paused = true)]
    async fn test_quota_then_recovery() {
        let limiter = RateLimiter::new();
        limiter.register("ci", 2);

        limiter.check("ci", WINDOW).unwrap();
        limiter.admit("ci", WINDOW).unwrap();
        limiter.admit("ci", WINDOW).unwrap();
        assert!(matches!(
            limiter.check("ci", WINDOW),
            Err(Error::RateLimitExceeded { limit: 2, .. })
        ));
        assert!(limiter.admit("ci", WINDOW).is_err());

        tokio::time::advance(WINDOW).await;
        assert!(limiter.check("ci", WINDOW).is_ok());
        assert_eq!(limiter.count("ci", WINDOW), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_prune_all_bounds_memory() {
        let limiter = RateLimiter::new();
        limiter.register("idle", 10);
        limiter.register("busy", 10);
        for _ in 0..3 {
            limiter.admit("idle", WINDOW).unwrap();
        }
        tokio::time::advance(Duration::from_secs(61)).await;
        limiter.admit("busy", WINDOW).unwrap();

        assert_eq!(limiter.stored("idle"), 3);
        assert_eq!(limiter.prune_all(WINDOW), 3);
        assert_eq!(limiter.stored("idle"), 0);
        assert_eq!(limiter.stored("busy"), 1);
    }

    #[tokio::test]
    async fn test_unknown_connector_is_not_admitted() {
        let limiter = RateLimiter::new();
        assert!(limiter.check("ghost", WINDOW).is_ok());
        assert!(matches!(
            limiter.admit("ghost", WINDOW),
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_register_resets_window() {
        let limiter = RateLimiter::new();
        limiter.register("registry", 1);
        limiter.admit("registry", WINDOW).unwrap();
        limiter.register("registry", 5);
        assert_eq!(limiter.limit("registry"), Some(5));
        assert_eq!(limiter.stored("registry"), 0);
    }
}
