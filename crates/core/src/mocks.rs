//! Mock implementations of core traits for testing.
//!
//! `MockConnector` is scripted with a queue of replies and counts every call,
//! so gateway and pipeline tests can assert exactly how often a backend was
//! reached.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

use crate::{
    traits::Connector,
    types::{Credentials, RequestOptions},
    Error, Result,
};

// =============================================================================
// Mock Connector
// =============================================================================

/// One scripted outcome of `MockConnector::request`.
#[derive(Debug, Clone)]
pub enum MockReply {
    /// Succeed with the value.
    Value(Value),
    /// Fail with `RequestFailed` carrying the status.
    Status(u16),
    /// Fail with a transport timeout.
    Timeout,
    /// Fail with a network error.
    Network,
    /// Sleep, then succeed with the value.
    Delayed(Duration, Value),
}

/// Scripted connector that records every call.
pub struct MockConnector {
    replies: Mutex<VecDeque<MockReply>>,
    fallback: Value,
    token: String,
    expires_in: Option<u64>,
    auth_failure: Option<String>,
    health: Option<std::result::Result<Value, String>>,
    invalid: Option<String>,
    auth_calls: AtomicUsize,
    request_calls: AtomicUsize,
    health_calls: AtomicUsize,
    request_times: Mutex<Vec<Instant>>,
    last_token: Mutex<Option<String>>,
}

impl MockConnector {
    /// Create a mock that always answers with `response`.
    pub fn new(response: Value) -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            fallback: response,
            token: "mock-token".to_string(),
            expires_in: None,
            auth_failure: None,
            health: None,
            invalid: None,
            auth_calls: AtomicUsize::new(0),
            request_calls: AtomicUsize::new(0),
            health_calls: AtomicUsize::new(0),
            request_times: Mutex::new(Vec::new()),
            last_token: Mutex::new(None),
        }
    }

    /// Issue `token` with the given lifetime from `authenticate`.
    pub fn with_token(mut self, token: &str, expires_in: Option<u64>) -> Self {
        self.token = token.to_string();
        self.expires_in = expires_in;
        self
    }

    /// Make `authenticate` fail.
    pub fn with_auth_failure(mut self, message: &str) -> Self {
        self.auth_failure = Some(message.to_string());
        self
    }

    /// Queue replies consumed in order before falling back to the default.
    pub fn with_replies(self, replies: Vec<MockReply>) -> Self {
        self.replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(replies);
        self
    }

    /// Provide a dedicated health probe.
    pub fn with_health(mut self, health: std::result::Result<Value, String>) -> Self {
        self.health = Some(health);
        self
    }

    /// Fail registration-time validation.
    pub fn invalid(mut self, reason: &str) -> Self {
        self.invalid = Some(reason.to_string());
        self
    }

    /// Number of `authenticate` calls.
    pub fn auth_calls(&self) -> usize {
        self.auth_calls.load(Ordering::SeqCst)
    }

    /// Number of `request` calls.
    pub fn request_calls(&self) -> usize {
        self.request_calls.load(Ordering::SeqCst)
    }

    /// Number of `health_check` calls.
    pub fn health_calls(&self) -> usize {
        self.health_calls.load(Ordering::SeqCst)
    }

    /// Instants at which `request` was entered.
    pub fn request_times(&self) -> Vec<Instant> {
        self.request_times
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Token presented with the most recent request.
    pub fn last_token(&self) -> Option<String> {
        self.last_token
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn authenticate(&self) -> Result<Credentials> {
        self.auth_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = &self.auth_failure {
            return Err(Error::authentication_failed("mock", message.clone()));
        }
        let mut credentials = Credentials::new(self.token.clone());
        credentials.expires_in = self.expires_in;
        Ok(credentials)
    }

    async fn request(
        &self,
        _operation: &str,
        _options: &RequestOptions,
        credentials: &Credentials,
    ) -> Result<Value> {
        use secrecy::ExposeSecret;

        self.request_calls.fetch_add(1, Ordering::SeqCst);
        self.request_times
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Instant::now());
        *self.last_token.lock().unwrap_or_else(PoisonError::into_inner) =
            Some(credentials.token.expose_secret().clone());

        let reply = self
            .replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();

        match reply {
            None => Ok(self.fallback.clone()),
            Some(MockReply::Value(v)) => Ok(v),
            Some(MockReply::Status(status)) => Err(Error::request_failed(
                Some(status),
                format!("mock status {}", status),
            )),
            Some(MockReply::Timeout) => Err(Error::timeout("mock timeout")),
            Some(MockReply::Network) => Err(Error::network("mock connection reset")),
            Some(MockReply::Delayed(delay, v)) => {
                tokio::time::sleep(delay).await;
                Ok(v)
            }
        }
    }

    async fn health_check(&self) -> Option<Result<Value>> {
        let health = self.health.as_ref()?;
        self.health_calls.fetch_add(1, Ordering::SeqCst);
        Some(match health {
            Ok(v) => Ok(v.clone()),
            Err(msg) => Err(Error::request_failed(Some(503), msg.clone())),
        })
    }

    fn validate(&self) -> Result<()> {
        match &self.invalid {
            Some(reason) => Err(Error::contract_violation(reason.clone())),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_scripted_replies_then_fallback() {
        let mock = MockConnector::new(json!({ "ok": true }))
            .with_replies(vec![MockReply::Status(503), MockReply::Value(json!(1))]);
        let creds = mock.authenticate().await.unwrap();
        let options = RequestOptions::new();

        assert!(mock.request("op", &options, &creds).await.is_err());
        assert_eq!(mock.request("op", &options, &creds).await.unwrap(), json!(1));
        assert_eq!(
            mock.request("op", &options, &creds).await.unwrap(),
            json!({ "ok": true })
        );
        assert_eq!(mock.request_calls(), 3);
        assert_eq!(mock.last_token().as_deref(), Some("mock-token"));
    }
}
