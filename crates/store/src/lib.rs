#![deny(unused)]
//! Configuration stores for Connector Hub.
//!
//! The gateway persists its tunables as a JSON document under a fixed key.
//! Two backends are provided: a process-local map for tests and embedded use,
//! and a directory of JSON files for local persistence across restarts.

pub mod file_provider;
pub mod memory;

use std::sync::Arc;

use connector_hub_core::traits::ConfigStore;

pub use file_provider::FileConfigStore;
pub use memory::InMemoryConfigStore;

/// Pick the backend described by `config_dir`: file-backed when set,
/// in-memory otherwise.
pub fn config_store_from(config_dir: Option<&str>) -> Arc<dyn ConfigStore> {
    match config_dir {
        Some(dir) => {
            tracing::info!(dir = %dir, "Initializing file config store");
            Arc::new(FileConfigStore::new(dir))
        }
        None => {
            tracing::info!("Initializing in-memory config store");
            Arc::new(InMemoryConfigStore::new())
        }
    }
}
