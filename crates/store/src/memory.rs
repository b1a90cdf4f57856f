//! In-memory config store using DashMap.

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;

use connector_hub_core::{traits::ConfigStore, Result};

/// Process-local key-value store. Contents are lost on restart.
#[derive(Debug, Default)]
pub struct InMemoryConfigStore {
    data: DashMap<String, Value>,
}

impl InMemoryConfigStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored documents.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[async_trait]
impl ConfigStore for InMemoryConfigStore {
    async fn load(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.data.get(key).map(|v| v.value().clone()))
    }

    async fn save(&self, key: &str, value: &Value) -> Result<()> {
        self.data.insert(key.to_string(), value.clone());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        Ok(self.data.remove(key).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_save_load_delete() {
        let store = InMemoryConfigStore::new();
        assert!(store.load("cfg").await.unwrap().is_none());

        store.save("cfg", &json!({ "timeout": 10 })).await.unwrap();
        assert_eq!(store.load("cfg").await.unwrap(), Some(json!({ "timeout": 10 })));
        assert_eq!(store.len(), 1);

        assert!(store.delete("cfg").await.unwrap());
        assert!(!store.delete("cfg").await.unwrap());
        assert!(store.is_empty());
    }
}
