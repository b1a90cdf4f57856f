use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Registration-time options for a connector.
#[derive(Debug, Clone, Default)]
pub struct ConnectorOptions {
    /// Opaque configuration blob kept alongside the connector.
    pub config: Value,
    /// Quota override; falls back to `maxRequestsPerWindow`.
    pub rate_limit: Option<u32>,
}

impl ConnectorOptions {
    pub fn with_config(mut self, config: Value) -> Self {
        self.config = config;
        self
    }

    pub fn with_rate_limit(mut self, limit: u32) -> Self {
        self.rate_limit = Some(limit);
        self
    }
}

/// Read-only view of a registered connector.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectorInfo {
    pub name: String,
    pub config: Value,
    pub authenticated: bool,
    pub last_auth_time: Option<DateTime<Utc>>,
    /// Effective quota per rate-limit window.
    pub rate_limit: u32,
}
