use async_trait::async_trait;
use serde_json::Value;
use std::path::PathBuf;

use connector_hub_core::{traits::ConfigStore, Error, Result};

/// Persistent config store keeping one pretty-printed JSON file per key.
pub struct FileConfigStore {
    dir: PathBuf,
}

impl FileConfigStore {
    /// Create a store rooted at `dir`. The directory is created on first save.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
            && !key.starts_with('.');
        if !valid {
            return Err(Error::storage(format!("Invalid config key: {:?}", key)));
        }
        Ok(self.dir.join(format!("{}.json", key)))
    }
}

#[async_trait]
impl ConfigStore for FileConfigStore {
    async fn load(&self, key: &str) -> Result<Option<Value>> {
        let path = self.path_for(key)?;
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(Error::storage(format!("Failed to read config file: {}", e)));
            }
        };
        let value = serde_json::from_str(&content)
            .map_err(|e| Error::storage(format!("Failed to parse config file: {}", e)))?;
        Ok(Some(value))
    }

    async fn save(&self, key: &str, value: &Value) -> Result<()> {
        let path = self.path_for(key)?;
        let content = serde_json::to_string_pretty(value)?;
        tokio::fs::create_dir_all(&self.dir).await.map_err(|e| {
            Error::storage(format!("Failed to create config directory: {}", e))
        })?;

        // Readers never observe a partially written document.
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, content)
            .await
            .map_err(|e| Error::storage(format!("Failed to write config file: {}", e)))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| Error::storage(format!("Failed to replace config file: {}", e)))?;
        tracing::debug!(key = key, path = %path.display(), "Config document saved");
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let path = self.path_for(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(Error::storage(format!("Failed to delete config file: {}", e))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_roundtrip_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileConfigStore::new(dir.path().join("nested"));

        assert!(store.load("enterprise-api-config").await.unwrap().is_none());
        store
            .save("enterprise-api-config", &json!({ "retryAttempts": 5 }))
            .await
            .unwrap();

        let reopened = FileConfigStore::new(dir.path().join("nested"));
        assert_eq!(
            reopened.load("enterprise-api-config").await.unwrap(),
            Some(json!({ "retryAttempts": 5 }))
        );
        assert!(reopened.delete("enterprise-api-config").await.unwrap());
        assert!(!reopened.delete("enterprise-api-config").await.unwrap());
    }

    #[tokio::test]
    async fn test_rejects_path_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileConfigStore::new(dir.path());
        assert!(matches!(
            store.save("../escape", &json!(1)).await,
            Err(Error::Storage(_))
        ));
        assert!(store.load("a/b").await.is_err());
    }

    #[tokio::test]
    async fn test_corrupt_document_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("cfg.json"), "{ not json")
            .await
            .unwrap();
        let store = FileConfigStore::new(dir.path());
        assert!(matches!(store.load("cfg").await, Err(Error::Storage(_))));
    }
}
