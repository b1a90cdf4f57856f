//! Time-boxed response cache keyed by connector, operation and options.

use dashmap::DashMap;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::time::Duration;
use tokio::time::Instant;

use connector_hub_core::types::RequestOptions;

/// Cached response with its creation instant.
#[derive(Debug, Clone)]
struct CacheEntry {
    /// Cached response.
    value: Value,
    /// When the entry was created.
    created_at: Instant,
    /// Hit count for analytics.
    hit_count: u64,
}

impl CacheEntry {
    /// Single staleness rule shared by lazy reads and the periodic sweep.
    fn is_expired(&self, now: Instant, ttl: Duration) -> bool {
        now.saturating_duration_since(self.created_at) >= ttl
    }
}

/// Build the deterministic cache key for a call.
///
/// Layout is `connector:operation:sha256(canonical options)`; connector names
/// cannot contain `:`, so the connector prefix is unambiguous.
pub fn cache_key(connector: &str, operation: &str, options: &RequestOptions) -> String {
    let mut hasher = Sha256::new();
    hasher.update(options.fingerprint().as_bytes());
    format!("{}:{}:{:x}", connector, operation, hasher.finalize())
}

/// In-memory response cache.
#[derive(Debug, Default)]
pub struct ResponseCache {
    entries: DashMap<String, CacheEntry>,
}

impl ResponseCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch a live entry. Expired entries are removed and reported as absent.
    pub fn get(&self, key: &str, ttl: Duration) -> Option<Value> {
        let now = Instant::now();
        if let Some(mut entry) = self.entries.get_mut(key) {
            if !entry.is_expired(now, ttl) {
                entry.hit_count += 1;
                return Some(entry.value.clone());
            }
        } else {
            return None;
        }
        self.entries
            .remove_if(key, |_, entry| entry.is_expired(now, ttl));
        None
    }

    /// Store a response, replacing any previous entry.
    pub fn insert(&self, key: String, value: Value) {
        self.entries.insert(
            key,
            CacheEntry {
                value,
                created_at: Instant::now(),
                hit_count: 0,
            },
        );
    }

    /// Evict every expired entry. Returns how many were removed.
    pub fn sweep(&self, ttl: Duration) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now, ttl));
        before.saturating_sub(self.entries.len())
    }

    /// Drop every entry belonging to `connector`.
    pub fn invalidate_connector(&self, connector: &str) -> usize {
        let prefix = format!("{}:", connector);
        let before = self.entries.len();
        self.entries.retain(|key, _| !key.starts_with(&prefix));
        before.saturating_sub(self.entries.len())
    }

    /// Drop everything.
    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Physically stored entries, expired ones included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total hits served across live entries.
    pub fn total_hits(&self) -> u64 {
        self.entries.iter().map(|e| e.hit_count).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const TTL: Duration = Duration::from_secs(300);

    #[tokio::test(start_paused = true)]
    async fn test_hit_within_ttl() {
        let cache = ResponseCache::new();
        cache.insert("k".into(), json!({ "ok": true }));

        tokio::time::advance(Duration::from_secs(299)).await;
        assert_eq!(cache.get("k", TTL), Some(json!({ "ok": true })));
        assert_eq!(cache.total_hits(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lazy_expiry_removes_entry() {
        let cache = ResponseCache::new();
        cache.insert("k".into(), json!(1));

        tokio::time::advance(TTL).await;
        assert_eq!(cache.get("k", TTL), None);
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_agrees_with_lazy_read() {
        let cache = ResponseCache::new();
        cache.insert("old".into(), json!(1));
        tokio::time::advance(Duration::from_secs(200)).await;
        cache.insert("young".into(), json!(2));
        tokio::time::advance(Duration::from_secs(100)).await;

        // "old" is exactly TTL old: stale on both paths.
        assert_eq!(cache.sweep(TTL), 1);
        assert_eq!(cache.get("old", TTL), None);
        assert_eq!(cache.get("young", TTL), Some(json!(2)));
    }

    #[test]
    fn test_key_is_stable_and_scoped() {
        let options = RequestOptions::new().with_param("repo", json!("hub"));
        let a = cache_key("github", "repos/list", &options);
        let b = cache_key("github", "repos/list", &options.clone().no_cache());
        assert_eq!(a, b);
        assert!(a.starts_with("github:repos/list:"));
        assert_ne!(a, cache_key("gitlab", "repos/list", &options));
    }

    #[tokio::test]
    async fn test_invalidate_connector() {
        let cache = ResponseCache::new();
        let options = RequestOptions::new();
        cache.insert(cache_key("jira", "issues", &options), json!(1));
        cache.insert(cache_key("jira-cloud", "issues", &options), json!(2));

        assert_eq!(cache.invalidate_connector("jira"), 1);
        assert_eq!(cache.len(), 1);
    }
}
