//! Background sweeps: cache eviction, rate-limit pruning and health checks.
//!
//! The tasks hold a `Weak` reference to the gateway state and exit on their
//! own once the gateway is dropped; `MaintenanceHandle` aborts them eagerly.

use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::gateway::GatewayState;

/// Owner of the sweep tasks.
#[derive(Debug, Default)]
pub(crate) struct MaintenanceHandle {
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl MaintenanceHandle {
    /// Spawn every sweep for `state`.
    pub(crate) fn spawn(state: &Arc<GatewayState>) -> Self {
        let cache_task = tokio::spawn(cache_sweeper(Arc::downgrade(state)));
        let limiter_task = tokio::spawn(rate_limit_sweeper(Arc::downgrade(state)));
        let health_task = tokio::spawn(health_monitor(Arc::downgrade(state)));
        Self {
            tasks: Mutex::new(vec![cache_task, limiter_task, health_task]),
        }
    }

    /// A handle owning no tasks.
    pub(crate) fn disabled() -> Self {
        Self::default()
    }

    /// Abort every running sweep.
    pub(crate) fn shutdown(&self) {
        let tasks = std::mem::take(&mut *self.tasks.lock().unwrap_or_else(PoisonError::into_inner));
        if !tasks.is_empty() {
            tracing::debug!(tasks = tasks.len(), "Stopping gateway maintenance");
        }
        for task in tasks {
            task.abort();
        }
    }

    /// Number of sweeps still owned.
    pub(crate) fn running(&self) -> usize {
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|t| !t.is_finished())
            .count()
    }
}

impl Drop for MaintenanceHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Period is re-read every tick so configuration updates take effect.
async fn cache_sweeper(state: Weak<GatewayState>) {
    loop {
        let period = match state.upgrade() {
            Some(s) => Duration::from_millis(s.config().cache_timeout_ms),
            None => return,
        };
        tokio::time::sleep(period).await;
        let Some(s) = state.upgrade() else { return };
        s.sweep_cache();
    }
}

async fn rate_limit_sweeper(state: Weak<GatewayState>) {
    loop {
        let period = match state.upgrade() {
            Some(s) => Duration::from_millis(s.config().rate_limit_cleanup_interval_ms),
            None => return,
        };
        tokio::time::sleep(period).await;
        let Some(s) = state.upgrade() else { return };
        s.prune_rate_limits();
    }
}

async fn health_monitor(state: Weak<GatewayState>) {
    loop {
        let period = match state.upgrade() {
            Some(s) => Duration::from_millis(s.config().health_check_interval_ms),
            None => return,
        };
        tokio::time::sleep(period).await;
        let Some(s) = state.upgrade() else { return };
        s.health_check_all().await;
    }
}
