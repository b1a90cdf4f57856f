//! Generic JSON-over-HTTP connector.
//!
//! `operation` is appended to the base URL as a path, connector parameters
//! become the query string, and the static bearer token configured for the
//! backend is presented on every call.

use async_trait::async_trait;
use secrecy::{ExposeSecret, Secret};
use serde_json::{json, Map, Value};
use std::time::Duration;

use connector_hub_core::config::HttpConnectorConfig;
use connector_hub_core::{Connector, Credentials, Error, RequestOptions, Result};

const MAX_ERROR_BODY: usize = 512;

/// Connector for a REST backend.
#[derive(Clone)]
pub struct HttpConnector {
    name: String,
    base_url: String,
    token: Option<Secret<String>>,
    token_expires_in: Option<u64>,
    health_path: Option<String>,
    client: reqwest::Client,
}

impl HttpConnector {
    pub fn new(name: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into(),
            token: None,
            token_expires_in: None,
            health_path: None,
            client: reqwest::Client::new(),
        }
    }

    pub fn from_config(config: &HttpConnectorConfig) -> Self {
        Self {
            name: config.name.clone(),
            base_url: config.base_url.clone(),
            token: config.token.clone(),
            token_expires_in: config.token_expires_in,
            health_path: config.health_path.clone(),
            client: reqwest::Client::new(),
        }
    }

    /// Static bearer token, optionally with a lifetime in seconds.
    pub fn with_token(mut self, token: impl Into<String>, expires_in: Option<u64>) -> Self {
        self.token = Some(Secret::new(token.into()));
        self.token_expires_in = expires_in;
        self
    }

    /// Path probed by `health_check`.
    pub fn with_health_path(mut self, path: impl Into<String>) -> Self {
        self.health_path = Some(path.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn endpoint(&self, path: &str) -> String {
        let base = self.base_url.trim_end_matches('/');
        let path = path.trim_start_matches('/');
        if path.is_empty() {
            base.to_string()
        } else {
            format!("{}/{}", base, path)
        }
    }
}

impl std::fmt::Debug for HttpConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpConnector")
            .field("name", &self.name)
            .field("base_url", &self.base_url)
            .field("has_token", &self.token.is_some())
            .field("health_path", &self.health_path)
            .finish()
    }
}

/// Render parameters as query pairs; strings are sent unquoted.
fn query_pairs(params: &Map<String, Value>) -> Vec<(String, String)> {
    params
        .iter()
        .filter(|(_, v)| !v.is_null())
        .map(|(k, v)| {
            let rendered = match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (k.clone(), rendered)
        })
        .collect()
}

/// Classify a reqwest failure. Anything that broke the exchange itself
/// (refused, reset, closed mid-body) is a network error and retryable.
fn transport_error(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::timeout(e.to_string())
    } else if let Some(status) = e.status() {
        Error::request_failed(Some(status.as_u16()), e.to_string())
    } else if e.is_builder() {
        Error::request_failed(None, e.to_string())
    } else {
        Error::network(e.to_string())
    }
}

/// Parse a response body: JSON when possible, a string otherwise.
fn parse_body(text: &str) -> Value {
    if text.trim().is_empty() {
        return Value::Null;
    }
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
}

fn truncate(text: &str) -> &str {
    match text.char_indices().nth(MAX_ERROR_BODY) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

async fn read_response(response: reqwest::Response) -> Result<Value> {
    let status = response.status();
    let text = response.text().await.map_err(transport_error)?;
    if !status.is_success() {
        return Err(Error::request_failed(
            Some(status.as_u16()),
            format!("{}: {}", status, truncate(&text)),
        ));
    }
    Ok(parse_body(&text))
}

#[async_trait]
impl Connector for HttpConnector {
    async fn authenticate(&self) -> Result<Credentials> {
        let Some(token) = &self.token else {
            return Ok(Credentials::anonymous());
        };
        let mut credentials = Credentials::new(token.expose_secret().clone());
        credentials.expires_in = self.token_expires_in;
        Ok(credentials)
    }

    async fn request(
        &self,
        operation: &str,
        options: &RequestOptions,
        credentials: &Credentials,
    ) -> Result<Value> {
        let method_name = options.method.as_deref().unwrap_or("GET").to_uppercase();
        let method = reqwest::Method::from_bytes(method_name.as_bytes())
            .map_err(|_| Error::request_failed(None, format!("unsupported method '{}'", method_name)))?;
        let url = self.endpoint(operation);

        let mut builder = self.client.request(method, &url);
        let query = query_pairs(&options.params);
        if !query.is_empty() {
            builder = builder.query(&query);
        }
        for (name, value) in &options.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        let token = credentials.token.expose_secret();
        if !token.is_empty() {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = &options.body {
            builder = builder.json(body);
        }
        if let Some(ms) = options.timeout_ms {
            builder = builder.timeout(Duration::from_millis(ms));
        }

        tracing::debug!(connector = %self.name, url = %url, method = %method_name, "Sending HTTP request");
        let response = builder.send().await.map_err(transport_error)?;
        read_response(response).await
    }

    async fn health_check(&self) -> Option<Result<Value>> {
        let path = self.health_path.as_deref()?;
        let url = self.endpoint(path);
        let outcome = match self.client.get(&url).send().await {
            Ok(response) => {
                let status = response.status().as_u16();
                read_response(response)
                    .await
                    .map(|_| json!({ "status": status }))
            }
            Err(e) => Err(transport_error(e)),
        };
        Some(outcome)
    }

    fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(Error::contract_violation("HTTP connector needs a name"));
        }
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(Error::contract_violation(format!(
                "connector '{}' has invalid base URL '{}'",
                self.name, self.base_url
            )));
        }
        Ok(())
    }
}
