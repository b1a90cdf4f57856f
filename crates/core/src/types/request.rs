use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

// =============================================================================
// Request Types
// =============================================================================

/// Options accompanying a gateway call.
///
/// `use_cache`, `cache` and `timeout_ms` steer the gateway itself; everything
/// else is forwarded to the connector and participates in the cache key.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct RequestOptions {
    /// Read from the response cache (default true).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub use_cache: Option<bool>,

    /// Store the response in the cache (default true).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache: Option<bool>,

    /// Transport verb, e.g. `GET`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,

    /// Extra transport headers.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,

    /// Request payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,

    /// Per-call deadline overriding the gateway default.
    #[serde(rename = "timeout", skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,

    /// Connector-specific parameters.
    #[serde(flatten)]
    pub params: Map<String, Value>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Skip both the cache read and the cache write.
    pub fn no_cache(mut self) -> Self {
        self.use_cache = Some(false);
        self.cache = Some(false);
        self
    }

    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: Value) -> Self {
        self.params.insert(key.into(), value);
        self
    }

    /// Whether a cached response may satisfy this call.
    pub fn reads_cache(&self) -> bool {
        self.use_cache.unwrap_or(true)
    }

    /// Whether a fresh response should be stored.
    pub fn writes_cache(&self) -> bool {
        self.cache.unwrap_or(true)
    }

    /// Canonical JSON of the fields that identify the call.
    ///
    /// Object keys are sorted recursively, so two option sets that differ only
    /// in insertion order produce the same fingerprint.
    pub fn fingerprint(&self) -> String {
        let mut identity = self.clone();
        identity.use_cache = None;
        identity.cache = None;
        identity.timeout_ms = None;
        let value = serde_json::to_value(&identity).unwrap_or(Value::Null);
        canonical_json(&value)
    }
}

/// Render `value` as JSON with recursively sorted object keys.
pub fn canonical_json(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<&String, &Value> = map.iter().collect();
            let fields: Vec<String> = sorted
                .into_iter()
                .map(|(k, v)| format!("{}:{}", Value::String(k.clone()), canonical_json(v)))
                .collect();
            format!("{{{}}}", fields.join(","))
        }
        Value::Array(items) => {
            let items: Vec<String> = items.iter().map(canonical_json).collect();
            format!("[{}]", items.join(","))
        }
        other => other.to_string(),
    }
}
