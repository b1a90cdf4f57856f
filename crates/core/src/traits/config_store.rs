//! Configuration persistence traits.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;

/// Local key-value store holding JSON documents.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Load the document stored under `key`.
    async fn load(&self, key: &str) -> Result<Option<Value>>;

    /// Store `value` under `key`, replacing any previous document.
    async fn save(&self, key: &str, value: &Value) -> Result<()>;

    /// Remove `key`. Returns whether a document existed.
    async fn delete(&self, key: &str) -> Result<bool>;
}
