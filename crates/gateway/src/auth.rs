//! Per-connector credential cache with expiry tracking.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

use connector_hub_core::types::Credentials;

/// Credentials plus the instant they were acquired.
///
/// Replaced wholesale on refresh, never mutated in place.
#[derive(Debug, Clone)]
pub struct AuthToken {
    pub credentials: Arc<Credentials>,
    pub acquired_at: Instant,
    pub acquired_wall: DateTime<Utc>,
}

impl AuthToken {
    pub fn new(credentials: Credentials) -> Self {
        Self {
            credentials: Arc::new(credentials),
            acquired_at: Instant::now(),
            acquired_wall: Utc::now(),
        }
    }

    /// Expired once strictly older than `expires_in` seconds.
    pub fn is_expired(&self, now: Instant) -> bool {
        match self.credentials.expires_in {
            Some(seconds) => {
                now.saturating_duration_since(self.acquired_at) > Duration::from_secs(seconds)
            }
            None => false,
        }
    }
}

/// Token store owned by the gateway.
#[derive(Debug, Default)]
pub struct TokenStore {
    tokens: DashMap<String, AuthToken>,
    refresh_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl TokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Live credentials of `connector`, if any.
    pub fn valid(&self, connector: &str) -> Option<Arc<Credentials>> {
        let now = Instant::now();
        self.tokens
            .get(connector)
            .filter(|t| !t.is_expired(now))
            .map(|t| t.credentials.clone())
    }

    /// Replace the token of `connector`.
    pub fn store(&self, connector: &str, credentials: Credentials) -> Arc<Credentials> {
        let token = AuthToken::new(credentials);
        let credentials = token.credentials.clone();
        self.tokens.insert(connector.to_string(), token);
        credentials
    }

    /// Current token regardless of expiry.
    pub fn get(&self, connector: &str) -> Option<AuthToken> {
        self.tokens.get(connector).map(|t| t.clone())
    }

    /// Forget the token and refresh lock of `connector`.
    pub fn remove(&self, connector: &str) {
        self.tokens.remove(connector);
        self.refresh_locks.remove(connector);
    }

    /// Drop the token of `connector` so the next call re-authenticates.
    pub fn invalidate(&self, connector: &str) -> bool {
        self.tokens.remove(connector).is_some()
    }

    /// Lock serializing refreshes of one connector so concurrent callers
    /// share a single `authenticate` round trip.
    pub fn refresh_lock(&self, connector: &str) -> Arc<Mutex<()>> {
        self.refresh_locks
            .entry(connector.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}
