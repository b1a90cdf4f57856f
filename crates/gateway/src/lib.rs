#![deny(unused)]
//! Connector gateway for Connector Hub.
//!
//! Registers connectors by name and routes every call through response
//! caching, per-connector sliding-window quotas, credential refresh and
//! exponential-backoff retries.

pub mod auth;
pub mod cache;
pub mod gateway;
mod maintenance;
pub mod rate_limit;
pub mod retry;
pub mod stats;

pub use auth::{AuthToken, TokenStore};
pub use cache::{cache_key, ResponseCache};
pub use gateway::{ConnectorGateway, GatewayBuilder};
pub use rate_limit::RateLimiter;
pub use retry::RetryPolicy;
pub use stats::GatewayStats;
