use secrecy::Secret;
use serde::Deserialize;
use serde_json::Value;

/// Credential payload produced by a connector's `authenticate`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    /// Bearer token or equivalent secret.
    pub token: Secret<String>,
    /// Lifetime in seconds. `None` never expires.
    #[serde(default)]
    pub expires_in: Option<u64>,
    /// Provider-specific extras (scopes, account id, ...).
    #[serde(default)]
    pub metadata: Value,
}

impl Credentials {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: Secret::new(token.into()),
            expires_in: None,
            metadata: Value::Null,
        }
    }

    pub fn with_expires_in(mut self, seconds: u64) -> Self {
        self.expires_in = Some(seconds);
        self
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }

    /// Credentials for backends that need none.
    pub fn anonymous() -> Self {
        Self::new(String::new())
    }
}
