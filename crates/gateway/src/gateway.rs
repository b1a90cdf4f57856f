//! The connector gateway: registry, dispatch, caching, quotas and auth.

use dashmap::DashMap;
use futures::future::join_all;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tokio::time::Instant;

use connector_hub_core::config::{GatewayConfig, GatewayConfigPatch, GATEWAY_CONFIG_KEY};
use connector_hub_core::{
    ConfigStore, Connector, ConnectorInfo, ConnectorOptions, Credentials, Error, EventBus,
    GatewayEvent, HealthReport, ListenerId, OverallHealth, RequestOptions, Result,
};
use connector_hub_store::InMemoryConfigStore;

use crate::auth::TokenStore;
use crate::cache::{cache_key, ResponseCache};
use crate::maintenance::MaintenanceHandle;
use crate::rate_limit::RateLimiter;
use crate::retry::RetryPolicy;
use crate::stats::{GatewayStats, StatsRecorder};

// =============================================================================
// Registry
// =============================================================================

struct RegisteredConnector {
    connector: Arc<dyn Connector>,
    config: Value,
    rate_limit_override: Option<u32>,
}

/// State shared by gateway handles and the maintenance tasks.
pub(crate) struct GatewayState {
    connectors: DashMap<String, RegisteredConnector>,
    cache: ResponseCache,
    limiter: RateLimiter,
    tokens: TokenStore,
    config: RwLock<GatewayConfig>,
    config_store: Arc<dyn ConfigStore>,
    events: Arc<EventBus<GatewayEvent>>,
    stats: StatsRecorder,
}

impl GatewayState {
    pub(crate) fn config(&self) -> GatewayConfig {
        self.config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn connector(&self, name: &str) -> Option<Arc<dyn Connector>> {
        self.connectors.get(name).map(|c| c.connector.clone())
    }

    pub(crate) fn sweep_cache(&self) -> usize {
        let ttl = Duration::from_millis(self.config().cache_timeout_ms);
        let removed = self.cache.sweep(ttl);
        tracing::debug!(removed, remaining = self.cache.len(), "Cache sweep finished");
        if removed > 0 {
            self.events.emit(&GatewayEvent::CacheCleanup { removed });
        }
        removed
    }

    pub(crate) fn prune_rate_limits(&self) -> usize {
        let window = Duration::from_millis(self.config().rate_limit_window_ms);
        let pruned = self.limiter.prune_all(window);
        tracing::debug!(pruned, "Rate-limit sweep finished");
        pruned
    }

    /// Single-flight: the refresh lock is re-checked after acquisition.
    pub(crate) async fn ensure_authentication(&self, connector: &str) -> Result<Arc<Credentials>> {
        if let Some(credentials) = self.tokens.valid(connector) {
            return Ok(credentials);
        }
        let handle = self
            .connector(connector)
            .ok_or_else(|| Error::not_found(connector))?;

        let lock = self.tokens.refresh_lock(connector);
        let _guard = lock.lock().await;
        if let Some(credentials) = self.tokens.valid(connector) {
            return Ok(credentials);
        }

        let deadline = Duration::from_millis(self.config().timeout_ms);
        let credentials = match tokio::time::timeout(deadline, handle.authenticate()).await {
            Ok(Ok(credentials)) => credentials,
            Ok(Err(Error::AuthenticationFailed { message, .. })) => {
                return Err(Error::authentication_failed(connector, message))
            }
            Ok(Err(other)) => return Err(Error::authentication_failed(connector, other.to_string())),
            Err(_) => {
                return Err(Error::authentication_failed(
                    connector,
                    format!("authentication exceeded {}ms", millis(deadline)),
                ))
            }
        };

        let expires_in = credentials.expires_in;
        let credentials = self.tokens.store(connector, credentials);
        tracing::info!(connector = %connector, expires_in = ?expires_in, "Credentials refreshed");
        self.events.emit(&GatewayEvent::AuthRefreshed {
            connector: connector.to_string(),
            expires_in,
        });
        Ok(credentials)
    }

    pub(crate) async fn health_check_all(&self) -> BTreeMap<String, HealthReport> {
        let targets: Vec<(String, Arc<dyn Connector>)> = self
            .connectors
            .iter()
            .map(|e| (e.key().clone(), e.connector.clone()))
            .collect();
        let deadline = Duration::from_millis(self.config().timeout_ms);

        let probes = targets.into_iter().map(|(name, connector)| async move {
            let started = Instant::now();
            let outcome = tokio::time::timeout(deadline, async {
                match connector.health_check().await {
                    Some(probe) => probe.map(|_| ()),
                    None => self.ensure_authentication(&name).await.map(|_| ()),
                }
            })
            .await
            .unwrap_or_else(|_| Err(Error::timeout("health check timed out")));
            let elapsed = millis(started.elapsed());

            let report = match outcome {
                Ok(()) => HealthReport::healthy(elapsed),
                Err(e) => {
                    tracing::warn!(connector = %name, error = %e, "Connector unhealthy");
                    HealthReport::unhealthy(elapsed, e.to_string())
                }
            };
            (name, report)
        });

        let results: BTreeMap<String, HealthReport> = join_all(probes).await.into_iter().collect();
        let healthy = results.values().filter(|r| r.is_healthy()).count();
        let overall = OverallHealth::from_reports(results.values());
        tracing::info!(total = results.len(), healthy, overall = overall.as_str(), "Health check complete");
        self.events.emit(&GatewayEvent::HealthCheckComplete {
            overall,
            results: results.clone(),
        });
        results
    }
}

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::contract_violation("connector name must not be empty"));
    }
    if name.contains(':') || name.chars().any(char::is_whitespace) {
        return Err(Error::contract_violation(format!(
            "connector name '{}' must not contain ':' or whitespace",
            name
        )));
    }
    Ok(())
}

fn millis(d: Duration) -> u64 {
    d.as_millis().min(u64::MAX as u128) as u64
}

// =============================================================================
// Builder
// =============================================================================

/// Builder for [`ConnectorGateway`].
pub struct GatewayBuilder {
    config: GatewayConfig,
    config_store: Option<Arc<dyn ConfigStore>>,
    events: Option<Arc<EventBus<GatewayEvent>>>,
    maintenance: bool,
}

impl Default for GatewayBuilder {
    fn default() -> Self {
        Self {
            config: GatewayConfig::default(),
            config_store: None,
            events: None,
            maintenance: true,
        }
    }
}

impl GatewayBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Base configuration; a persisted configuration is merged over it.
    pub fn with_config(mut self, config: GatewayConfig) -> Self {
        self.config = config;
        self
    }

    /// Key-value store holding the persisted configuration.
    pub fn with_config_store(mut self, store: Arc<dyn ConfigStore>) -> Self {
        self.config_store = Some(store);
        self
    }

    /// Publish events on an existing bus.
    pub fn with_event_bus(mut self, events: Arc<EventBus<GatewayEvent>>) -> Self {
        self.events = Some(events);
        self
    }

    /// Skip spawning the background sweeps.
    pub fn without_maintenance(mut self) -> Self {
        self.maintenance = false;
        self
    }

    /// Load the persisted configuration and start the sweeps.
    pub async fn build(self) -> Result<ConnectorGateway> {
        let config_store = self
            .config_store
            .unwrap_or_else(|| Arc::new(InMemoryConfigStore::new()));

        let mut config = self.config;
        match config_store.load(GATEWAY_CONFIG_KEY).await {
            Ok(Some(saved)) => match serde_json::from_value::<GatewayConfigPatch>(saved) {
                Ok(patch) => {
                    config.apply(&patch);
                    tracing::info!(key = GATEWAY_CONFIG_KEY, "Loaded persisted gateway configuration");
                }
                Err(e) => {
                    tracing::warn!(key = GATEWAY_CONFIG_KEY, error = %e, "Ignoring malformed persisted configuration");
                }
            },
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(key = GATEWAY_CONFIG_KEY, error = %e, "Failed to load persisted configuration");
            }
        }
        config.validate()?;

        let state = Arc::new(GatewayState {
            connectors: DashMap::new(),
            cache: ResponseCache::new(),
            limiter: RateLimiter::new(),
            tokens: TokenStore::new(),
            config: RwLock::new(config),
            config_store,
            events: self.events.unwrap_or_default(),
            stats: StatsRecorder::default(),
        });

        let maintenance = if self.maintenance {
            MaintenanceHandle::spawn(&state)
        } else {
            MaintenanceHandle::disabled()
        };

        Ok(ConnectorGateway {
            state,
            maintenance: Arc::new(maintenance),
        })
    }
}

// =============================================================================
// Gateway
// =============================================================================

/// Uniform front door to heterogeneous backends.
///
/// Cloning yields another handle on the same gateway. The sweeps stop when
/// the last handle is dropped or [`shutdown`](Self::shutdown) is called.
#[derive(Clone)]
pub struct ConnectorGateway {
    state: Arc<GatewayState>,
    maintenance: Arc<MaintenanceHandle>,
}

impl ConnectorGateway {
    pub fn builder() -> GatewayBuilder {
        GatewayBuilder::new()
    }

    /// Gateway with `config` and an in-memory configuration store.
    pub async fn new(config: GatewayConfig) -> Result<Self> {
        GatewayBuilder::new().with_config(config).build().await
    }

    // -------------------------------------------------------------------------
    // Registry
    // -------------------------------------------------------------------------

    /// Register `connector` under `name` with the default quota.
    pub fn register_connector(&self, name: &str, connector: Arc<dyn Connector>) -> Result<()> {
        self.register_connector_with(name, connector, ConnectorOptions::default())
    }

    /// Register `connector` under `name`.
    ///
    /// Re-registering a name replaces the connector and resets its window
    /// and token.
    pub fn register_connector_with(
        &self,
        name: &str,
        connector: Arc<dyn Connector>,
        options: ConnectorOptions,
    ) -> Result<()> {
        validate_name(name)?;
        connector.validate()?;
        if options.rate_limit == Some(0) {
            return Err(Error::contract_violation("rate limit must be at least 1"));
        }

        let limit = options
            .rate_limit
            .unwrap_or(self.state.config().max_requests_per_window);
        let replaced = self
            .state
            .connectors
            .insert(
                name.to_string(),
                RegisteredConnector {
                    connector,
                    config: options.config,
                    rate_limit_override: options.rate_limit,
                },
            )
            .is_some();
        self.state.limiter.register(name, limit);
        self.state.tokens.remove(name);
        if replaced {
            self.state.cache.invalidate_connector(name);
        }

        tracing::info!(connector = %name, rate_limit = limit, replaced, "Connector registered");
        self.state.events.emit(&GatewayEvent::ConnectorRegistered {
            connector: name.to_string(),
        });
        Ok(())
    }

    /// Remove `name` with its window, token and cached responses.
    pub fn remove_connector(&self, name: &str) -> bool {
        if self.state.connectors.remove(name).is_none() {
            return false;
        }
        self.state.limiter.remove(name);
        self.state.tokens.remove(name);
        let dropped = self.state.cache.invalidate_connector(name);

        tracing::info!(connector = %name, dropped_cache_entries = dropped, "Connector removed");
        self.state.events.emit(&GatewayEvent::ConnectorRemoved {
            connector: name.to_string(),
        });
        true
    }

    pub fn get_connector(&self, name: &str) -> Option<Arc<dyn Connector>> {
        self.state.connector(name)
    }

    /// Read-only view of a registered connector.
    pub fn connector_info(&self, name: &str) -> Option<ConnectorInfo> {
        let entry = self.state.connectors.get(name)?;
        let token = self.state.tokens.get(name);
        Some(ConnectorInfo {
            name: name.to_string(),
            config: entry.config.clone(),
            authenticated: self.state.tokens.valid(name).is_some(),
            last_auth_time: token.map(|t| t.acquired_wall),
            rate_limit: self
                .state
                .limiter
                .limit(name)
                .unwrap_or_else(|| self.state.config().max_requests_per_window),
        })
    }

    /// Registered names, sorted.
    pub fn connector_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .state
            .connectors
            .iter()
            .map(|e| e.key().clone())
            .collect();
        names.sort();
        names
    }

    // -------------------------------------------------------------------------
    // Dispatch
    // -------------------------------------------------------------------------

    /// Dispatch `operation` to the connector registered as `connector`.
    ///
    /// A cache hit returns without consuming quota or touching the backend.
    /// Otherwise the call is rate-checked, authenticated, admitted and run
    /// under the retry policy; successful results are cached.
    #[tracing::instrument(skip_all, fields(connector = %connector, operation = %operation))]
    pub async fn request(
        &self,
        connector: &str,
        operation: &str,
        options: &RequestOptions,
    ) -> Result<Value> {
        let state = &self.state;
        let handle = state
            .connector(connector)
            .ok_or_else(|| Error::not_found(connector))?;
        let config = state.config();
        let key = cache_key(connector, operation, options);

        if options.reads_cache() {
            let ttl = Duration::from_millis(config.cache_timeout_ms);
            if let Some(value) = state.cache.get(&key, ttl) {
                tracing::debug!(connector = %connector, operation = %operation, "Cache hit");
                state.stats.record_cache_hit(connector);
                state.events.emit(&GatewayEvent::CacheHit {
                    connector: connector.to_string(),
                    operation: operation.to_string(),
                });
                return Ok(value);
            }
        }

        let window = Duration::from_millis(config.rate_limit_window_ms);
        if let Err(e) = state.limiter.check(connector, window) {
            return Err(self.rejected(connector, operation, e));
        }

        let credentials = match self.ensure_authentication(connector).await {
            Ok(c) => c,
            Err(e) => return Err(self.failed(connector, operation, 0, Duration::ZERO, e)),
        };

        if let Err(e) = state.limiter.admit(connector, window) {
            return Err(self.rejected(connector, operation, e));
        }

        let policy = RetryPolicy::new(
            config.retry_attempts,
            Duration::from_millis(config.retry_delay_ms),
        );
        let deadline = Duration::from_millis(options.timeout_ms.unwrap_or(config.timeout_ms));
        let started = Instant::now();

        let (result, attempts) = policy
            .execute_with_retry(move |attempt| {
                let backend = handle.clone();
                let credentials = credentials.clone();
                async move {
                    tracing::debug!(connector = %connector, operation = %operation, attempt, "Dispatching");
                    match tokio::time::timeout(deadline, backend.request(operation, options, &credentials)).await {
                        Ok(outcome) => outcome,
                        Err(_) => Err(Error::timeout(format!(
                            "{}.{} exceeded {}ms",
                            connector,
                            operation,
                            millis(deadline)
                        ))),
                    }
                }
            })
            .await;
        let elapsed = started.elapsed();

        match result {
            Ok(value) => {
                if options.writes_cache() {
                    state.cache.insert(key, value.clone());
                }
                state.stats.record_outcome(connector, true, elapsed);
                tracing::info!(
                    connector = %connector,
                    operation = %operation,
                    attempts,
                    duration_ms = millis(elapsed),
                    "Request succeeded"
                );
                state.events.emit(&GatewayEvent::RequestSuccess {
                    connector: connector.to_string(),
                    operation: operation.to_string(),
                    attempts,
                    duration_ms: millis(elapsed),
                });
                Ok(value)
            }
            Err(e) => {
                if e.status() == Some(401) || matches!(e, Error::AuthenticationFailed { .. }) {
                    state.tokens.invalidate(connector);
                }
                Err(self.failed(connector, operation, attempts, elapsed, e))
            }
        }
    }

    /// Report a call refused before reaching the backend.
    fn rejected(&self, connector: &str, operation: &str, error: Error) -> Error {
        tracing::warn!(connector = %connector, operation = %operation, error = %error, "Request rejected");
        if matches!(error, Error::RateLimitExceeded { .. }) {
            self.state.stats.record_rate_limited(connector);
        }
        self.state.events.emit(&GatewayEvent::RequestError {
            connector: connector.to_string(),
            operation: operation.to_string(),
            attempts: 0,
            error: error.to_string(),
        });
        error
    }

    fn failed(
        &self,
        connector: &str,
        operation: &str,
        attempts: u32,
        elapsed: Duration,
        error: Error,
    ) -> Error {
        self.state.stats.record_outcome(connector, false, elapsed);
        tracing::error!(
            connector = %connector,
            operation = %operation,
            attempts,
            error = %error,
            "Request failed"
        );
        self.state.events.emit(&GatewayEvent::RequestError {
            connector: connector.to_string(),
            operation: operation.to_string(),
            attempts,
            error: error.to_string(),
        });
        error
    }

    /// Return live credentials for `connector`, authenticating when absent
    /// or expired. Concurrent callers share one `authenticate` call.
    pub async fn ensure_authentication(&self, connector: &str) -> Result<Arc<Credentials>> {
        self.state.ensure_authentication(connector).await
    }

    // -------------------------------------------------------------------------
    // Health
    // -------------------------------------------------------------------------

    /// Probe every connector concurrently.
    ///
    /// Connectors without a health probe are checked by authenticating.
    /// Neither the cache nor the rate-limit windows are touched.
    pub async fn health_check_all(&self) -> BTreeMap<String, HealthReport> {
        self.state.health_check_all().await
    }

    // -------------------------------------------------------------------------
    // Configuration
    // -------------------------------------------------------------------------

    /// Current configuration.
    pub fn configuration(&self) -> GatewayConfig {
        self.state.config()
    }

    /// Merge `patch`, persist the result and apply it.
    ///
    /// Connectors registered without an explicit quota pick up a new
    /// `maxRequestsPerWindow`.
    pub async fn update_configuration(&self, patch: GatewayConfigPatch) -> Result<GatewayConfig> {
        let mut next = self.state.config();
        next.apply(&patch);
        next.validate()?;

        self.state
            .config_store
            .save(GATEWAY_CONFIG_KEY, &serde_json::to_value(&next)?)
            .await?;

        *self
            .state
            .config
            .write()
            .unwrap_or_else(PoisonError::into_inner) = next.clone();
        for entry in self.state.connectors.iter() {
            if entry.rate_limit_override.is_none() {
                self.state
                    .limiter
                    .set_limit(entry.key(), next.max_requests_per_window);
            }
        }

        tracing::info!(config = ?next, "Gateway configuration updated");
        self.state.events.emit(&GatewayEvent::ConfigurationUpdated {
            config: next.clone(),
        });
        Ok(next)
    }

    // -------------------------------------------------------------------------
    // Cache and maintenance
    // -------------------------------------------------------------------------

    pub fn clear_cache(&self) {
        self.state.cache.clear();
        tracing::info!("Response cache cleared");
    }

    /// Drop every cached response of `connector`.
    pub fn invalidate(&self, connector: &str) -> usize {
        self.state.cache.invalidate_connector(connector)
    }

    pub fn cached_entries(&self) -> usize {
        self.state.cache.len()
    }

    /// Run one cache sweep now.
    pub fn sweep_cache(&self) -> usize {
        self.state.sweep_cache()
    }

    /// Run one rate-limit sweep now.
    pub fn prune_rate_limits(&self) -> usize {
        self.state.prune_rate_limits()
    }

    /// Admissions of `connector` inside the current window.
    pub fn window_usage(&self, connector: &str) -> usize {
        let window = Duration::from_millis(self.state.config().rate_limit_window_ms);
        self.state.limiter.count(connector, window)
    }

    /// Admission timestamps still held for `connector`, stale ones included.
    /// Drops back once the rate-limit sweep has run.
    pub fn tracked_admissions(&self, connector: &str) -> usize {
        self.state.limiter.stored(connector)
    }

    pub fn stats(&self) -> GatewayStats {
        self.state.stats.snapshot()
    }

    // -------------------------------------------------------------------------
    // Events
    // -------------------------------------------------------------------------

    pub fn events(&self) -> Arc<EventBus<GatewayEvent>> {
        self.state.events.clone()
    }

    pub fn subscribe(
        &self,
        listener: impl Fn(&GatewayEvent) -> Result<()> + Send + Sync + 'static,
    ) -> ListenerId {
        self.state.events.subscribe(listener)
    }

    pub fn subscribe_channel(&self) -> tokio::sync::mpsc::UnboundedReceiver<GatewayEvent> {
        self.state.events.subscribe_channel()
    }

    /// Stop the sweeps. Requests keep working.
    pub fn shutdown(&self) {
        self.maintenance.shutdown();
        tracing::info!("Connector gateway shut down");
    }

    /// Whether the sweeps are still running.
    pub fn maintenance_running(&self) -> bool {
        self.maintenance.running() > 0
    }
}

impl std::fmt::Debug for ConnectorGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectorGateway")
            .field("connectors", &self.connector_names())
            .field("config", &self.configuration())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connector_names_are_validated() {
        assert!(validate_name("github").is_ok());
        assert!(validate_name("aws-s3_eu.1").is_ok());
        assert!(matches!(validate_name(""), Err(Error::ContractViolation(_))));
        assert!(matches!(validate_name("a:b"), Err(Error::ContractViolation(_))));
        assert!(matches!(validate_name("a b"), Err(Error::ContractViolation(_))));
    }

    #[tokio::test]
    async fn test_builder_rejects_invalid_config() {
        let config = GatewayConfig {
            retry_attempts: 0,
            ..GatewayConfig::default()
        };
        let result = ConnectorGateway::builder()
            .with_config(config)
            .without_maintenance()
            .build()
            .await;
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
