//! Connector capability contract.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;
use crate::types::{Credentials, RequestOptions};

/// Adapter for one external backend (source control, CI, cloud, ...).
///
/// The gateway adds caching, rate limiting, retry and credential freshness on
/// top of this contract. Implementations must tolerate concurrent calls: the
/// gateway never serializes access to one connector.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Acquire credentials.
    ///
    /// Fail with [`crate::Error::AuthenticationFailed`] on rejected
    /// credentials or an unreachable identity provider.
    async fn authenticate(&self) -> Result<Credentials>;

    /// Perform one backend call and return the parsed response.
    ///
    /// Transport failures should surface as
    /// [`crate::Error::RequestFailed`] with the status when one exists, or as
    /// [`crate::Error::Timeout`] / [`crate::Error::Network`].
    async fn request(
        &self,
        operation: &str,
        options: &RequestOptions,
        credentials: &Credentials,
    ) -> Result<Value>;

    /// Lightweight liveness probe.
    ///
    /// `None` means the connector has no dedicated probe and the gateway
    /// re-verifies authentication instead.
    async fn health_check(&self) -> Option<Result<Value>> {
        None
    }

    /// Registration-time conformance check (required configuration present,
    /// endpoints well formed, ...).
    fn validate(&self) -> Result<()> {
        Ok(())
    }
}
