use config::{Config, ConfigError, Environment, File};
use secrecy::Secret;
use serde::{Deserialize, Serialize};

/// Key under which the gateway persists its configuration.
pub const GATEWAY_CONFIG_KEY: &str = "enterprise-api-config";

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub gateway: GatewayConfig,
    pub orchestrator: OrchestratorConfig,
    pub store: StoreConfig,
    pub telemetry: TelemetryConfig,
    pub connectors: Vec<HttpConnectorConfig>,
}

/// Tunables of the connector gateway. All durations are milliseconds.
///
/// The lowercase aliases let the fields be set from environment variables,
/// whose keys the `config` crate lowercases.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default, rename_all = "camelCase")]
pub struct GatewayConfig {
    /// Per-call deadline.
    #[serde(rename = "timeout")]
    pub timeout_ms: u64,
    /// Total attempts per call, first attempt included.
    #[serde(alias = "retryattempts")]
    pub retry_attempts: u32,
    /// Base backoff, doubled after every failed attempt.
    #[serde(rename = "retryDelay", alias = "retrydelay")]
    pub retry_delay_ms: u64,
    /// Cache entry TTL, also the cache sweep period.
    #[serde(rename = "cacheTimeout", alias = "cachetimeout")]
    pub cache_timeout_ms: u64,
    /// Sliding window length for rate limiting.
    #[serde(rename = "rateLimitWindow", alias = "ratelimitwindow")]
    pub rate_limit_window_ms: u64,
    /// Default per-connector quota inside one window.
    #[serde(alias = "maxrequestsperwindow")]
    pub max_requests_per_window: u32,
    /// Period of the rate-limit pruning sweep.
    #[serde(rename = "rateLimitCleanupInterval", alias = "ratelimitcleanupinterval")]
    pub rate_limit_cleanup_interval_ms: u64,
    /// Period of the background health sweep.
    #[serde(rename = "healthCheckInterval", alias = "healthcheckinterval")]
    pub health_check_interval_ms: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 30_000,
            retry_attempts: 3,
            retry_delay_ms: 1_000,
            cache_timeout_ms: 300_000,
            rate_limit_window_ms: 60_000,
            max_requests_per_window: 100,
            rate_limit_cleanup_interval_ms: 60_000,
            health_check_interval_ms: 30_000,
        }
    }
}

impl GatewayConfig {
    /// Apply every field present in `patch`.
    pub fn apply(&mut self, patch: &GatewayConfigPatch) {
        if let Some(v) = patch.timeout_ms {
            self.timeout_ms = v;
        }
        if let Some(v) = patch.retry_attempts {
            self.retry_attempts = v;
        }
        if let Some(v) = patch.retry_delay_ms {
            self.retry_delay_ms = v;
        }
        if let Some(v) = patch.cache_timeout_ms {
            self.cache_timeout_ms = v;
        }
        if let Some(v) = patch.rate_limit_window_ms {
            self.rate_limit_window_ms = v;
        }
        if let Some(v) = patch.max_requests_per_window {
            self.max_requests_per_window = v;
        }
        if let Some(v) = patch.rate_limit_cleanup_interval_ms {
            self.rate_limit_cleanup_interval_ms = v;
        }
        if let Some(v) = patch.health_check_interval_ms {
            self.health_check_interval_ms = v;
        }
    }

    /// Reject values that would stall the sweeps or disable every call.
    pub fn validate(&self) -> crate::Result<()> {
        if self.retry_attempts == 0 {
            return Err(crate::Error::config("retryAttempts must be at least 1"));
        }
        if self.cache_timeout_ms == 0 || self.rate_limit_window_ms == 0 {
            return Err(crate::Error::config(
                "cacheTimeout and rateLimitWindow must be positive",
            ));
        }
        if self.rate_limit_cleanup_interval_ms == 0
            || self.health_check_interval_ms == 0
            || self.timeout_ms == 0
        {
            return Err(crate::Error::config(
                "timeout, rateLimitCleanupInterval and healthCheckInterval must be positive",
            ));
        }
        Ok(())
    }
}

/// Partial update for [`GatewayConfig`]; absent fields are left untouched.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
#[serde(default, rename_all = "camelCase")]
pub struct GatewayConfigPatch {
    #[serde(rename = "timeout", skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_attempts: Option<u32>,
    #[serde(rename = "retryDelay", skip_serializing_if = "Option::is_none")]
    pub retry_delay_ms: Option<u64>,
    #[serde(rename = "cacheTimeout", skip_serializing_if = "Option::is_none")]
    pub cache_timeout_ms: Option<u64>,
    #[serde(rename = "rateLimitWindow", skip_serializing_if = "Option::is_none")]
    pub rate_limit_window_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_requests_per_window: Option<u32>,
    #[serde(rename = "rateLimitCleanupInterval", skip_serializing_if = "Option::is_none")]
    pub rate_limit_cleanup_interval_ms: Option<u64>,
    #[serde(rename = "healthCheckInterval", skip_serializing_if = "Option::is_none")]
    pub health_check_interval_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Number of terminal pipelines retained in memory.
    pub history_limit: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self { history_limit: 50 }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StoreConfig {
    /// Directory of the file-backed config store. In-memory when unset.
    pub config_dir: Option<String>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            config_dir: Some(".connector-hub".into()),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct TelemetryConfig {
    pub json_logs: bool,
    pub metrics_enabled: bool,
}

/// Declarative definition of an HTTP connector registered at startup.
#[derive(Debug, Deserialize, Clone)]
pub struct HttpConnectorConfig {
    pub name: String,
    pub base_url: String,
    pub token: Option<Secret<String>>,
    /// Lifetime of `token` in seconds.
    pub token_expires_in: Option<u64>,
    /// Overrides `maxRequestsPerWindow` for this connector.
    pub rate_limit: Option<u32>,
    /// Relative path probed by the health check.
    pub health_path: Option<String>,
}

/// Prefix of the environment overrides.
pub const ENV_PREFIX: &str = "CONNECTOR_HUB";

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with(Environment::with_prefix(ENV_PREFIX).separator("__"))
    }

    /// Layer the config files under `environment`.
    pub fn load_with(environment: Environment) -> Result<Self, ConfigError> {
        let env = std::env::var("CONNECTOR_HUB_ENV").unwrap_or_else(|_| "development".into());

        let s = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            .add_source(File::with_name("config/local").required(false))
            // Map CONNECTOR_HUB__GATEWAY__RETRYATTEMPTS=5 to gateway.retryattempts
            .add_source(environment)
            .build()?;

        s.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gateway_defaults() {
        let config = GatewayConfig::default();
        assert_eq!(config.retry_attempts, 3);
        assert_eq!(config.retry_delay_ms, 1_000);
        assert_eq!(config.cache_timeout_ms, 300_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_patch_applies_only_present_fields() {
        let mut config = GatewayConfig::default();
        let patch = GatewayConfigPatch {
            retry_attempts: Some(5),
            max_requests_per_window: Some(10),
            ..Default::default()
        };
        config.apply(&patch);

        assert_eq!(config.retry_attempts, 5);
        assert_eq!(config.max_requests_per_window, 10);
        assert_eq!(config.timeout_ms, 30_000);
    }

    #[test]
    fn test_camel_case_wire_format() {
        let json = serde_json::to_value(GatewayConfig::default()).unwrap();
        assert_eq!(json["timeout"], 30_000);
        assert_eq!(json["retryAttempts"], 3);
        assert_eq!(json["maxRequestsPerWindow"], 100);

        let partial: GatewayConfig =
            serde_json::from_value(serde_json::json!({ "retryDelay": 250 })).unwrap();
        assert_eq!(partial.retry_delay_ms, 250);
        assert_eq!(partial.rate_limit_window_ms, 60_000);
    }

    #[test]
    fn test_environment_overrides_camel_case_fields() {
        let mut vars = config::Map::new();
        vars.insert("CONNECTOR_HUB__GATEWAY__RETRYATTEMPTS".to_string(), "5".to_string());
        vars.insert(
            "CONNECTOR_HUB__GATEWAY__MAXREQUESTSPERWINDOW".to_string(),
            "7".to_string(),
        );
        vars.insert("CONNECTOR_HUB__GATEWAY__TIMEOUT".to_string(), "2500".to_string());
        vars.insert(
            "CONNECTOR_HUB__ORCHESTRATOR__HISTORY_LIMIT".to_string(),
            "3".to_string(),
        );
        let environment = Environment::with_prefix(ENV_PREFIX)
            .separator("__")
            .source(Some(vars));

        let config = AppConfig::load_with(environment).unwrap();
        assert_eq!(config.gateway.retry_attempts, 5);
        assert_eq!(config.gateway.max_requests_per_window, 7);
        assert_eq!(config.gateway.timeout_ms, 2_500);
        assert_eq!(config.gateway.health_check_interval_ms, 30_000);
        assert_eq!(config.orchestrator.history_limit, 3);
    }

    #[test]
    fn test_zero_attempts_rejected() {
        let config = GatewayConfig {
            retry_attempts: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
