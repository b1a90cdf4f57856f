//! Publish/subscribe fan-out shared by the gateway and the orchestrator.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::mpsc;

use crate::config::GatewayConfig;
use crate::traits::EventListener;
use crate::types::{HealthReport, OverallHealth};
use crate::{Error, Result};

/// Handle returned by [`EventBus::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

struct Subscription<E> {
    id: ListenerId,
    listener: Arc<dyn EventListener<E>>,
}

/// Synchronous, ordered event fan-out.
///
/// Every listener sees every event in emission order. A listener that errors
/// or panics is logged and skipped; delivery to the others continues.
pub struct EventBus<E> {
    listeners: RwLock<Vec<Subscription<E>>>,
    next_id: AtomicU64,
}

impl<E: Send + Sync + 'static> EventBus<E> {
    /// Create a bus without listeners.
    pub fn new() -> Self {
        Self {
            listeners: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a listener.
    pub fn subscribe(&self, listener: impl EventListener<E> + 'static) -> ListenerId {
        self.subscribe_arc(Arc::new(listener))
    }

    /// Register a shared listener.
    pub fn subscribe_arc(&self, listener: Arc<dyn EventListener<E>>) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Subscription { id, listener });
        id
    }

    /// Forward every subsequent event into an unbounded channel.
    ///
    /// The subscription is dropped once the receiver is gone.
    pub fn subscribe_channel(&self) -> mpsc::UnboundedReceiver<E>
    where
        E: Clone,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribe(ChannelListener { tx });
        rx
    }

    /// Remove a listener. Returns whether it was registered.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write().unwrap_or_else(PoisonError::into_inner);
        let before = listeners.len();
        listeners.retain(|s| s.id != id);
        listeners.len() != before
    }

    /// Number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Deliver `event` to every listener in registration order.
    pub fn emit(&self, event: &E) {
        // Snapshot so listeners may (un)subscribe while being notified.
        let snapshot: Vec<(ListenerId, Arc<dyn EventListener<E>>)> = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|s| (s.id, s.listener.clone()))
            .collect();

        let mut closed = Vec::new();
        for (id, listener) in snapshot {
            if listener.is_closed() {
                closed.push(id);
                continue;
            }
            match catch_unwind(AssertUnwindSafe(|| listener.on_event(event))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::warn!(listener = id.0, error = %e, "Event listener failed");
                }
                Err(_) => {
                    tracing::warn!(listener = id.0, "Event listener panicked");
                }
            }
        }

        if !closed.is_empty() {
            self.listeners
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .retain(|s| !closed.contains(&s.id));
        }
    }
}

impl<E: Send + Sync + 'static> Default for EventBus<E> {
    fn default() -> Self {
        Self::new()
    }
}

struct ChannelListener<E> {
    tx: mpsc::UnboundedSender<E>,
}

impl<E: Clone + Send + Sync> EventListener<E> for ChannelListener<E> {
    fn on_event(&self, event: &E) -> Result<()> {
        self.tx
            .send(event.clone())
            .map_err(|_| Error::internal("event receiver dropped"))
    }

    fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

// =============================================================================
// Gateway Events
// =============================================================================

/// Lifecycle notifications published by the connector gateway.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum GatewayEvent {
    ConnectorRegistered {
        connector: String,
    },
    ConnectorRemoved {
        connector: String,
    },
    CacheHit {
        connector: String,
        operation: String,
    },
    AuthRefreshed {
        connector: String,
        expires_in: Option<u64>,
    },
    RequestSuccess {
        connector: String,
        operation: String,
        attempts: u32,
        duration_ms: u64,
    },
    RequestError {
        connector: String,
        operation: String,
        attempts: u32,
        error: String,
    },
    CacheCleanup {
        removed: usize,
    },
    HealthCheckComplete {
        overall: OverallHealth,
        results: BTreeMap<String, HealthReport>,
    },
    ConfigurationUpdated {
        config: GatewayConfig,
    },
}

impl GatewayEvent {
    /// Wire name of the event type.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ConnectorRegistered { .. } => "connector-registered",
            Self::ConnectorRemoved { .. } => "connector-removed",
            Self::CacheHit { .. } => "cache-hit",
            Self::AuthRefreshed { .. } => "auth-refreshed",
            Self::RequestSuccess { .. } => "request-success",
            Self::RequestError { .. } => "request-error",
            Self::CacheCleanup { .. } => "cache-cleanup",
            Self::HealthCheckComplete { .. } => "health-check-complete",
            Self::ConfigurationUpdated { .. } => "configuration-updated",
        }
    }
}
