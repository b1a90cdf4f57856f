use serde_json::json;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use connector_hub_connectors::HttpConnector;
use connector_hub_core::{Connector, Credentials, Error, RequestOptions};
use connector_hub_gateway::ConnectorGateway;

/// Answer exactly one HTTP request and hand back the raw request head.
async fn serve_once(status: &'static str, body: &'static str) -> (String, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut head = Vec::new();
        let mut chunk = [0u8; 1024];
        loop {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            head.extend_from_slice(&chunk[..n]);
            if head.windows(4).any(|w| w == b"\r\n\r\n") {
                break;
            }
        }
        let response = format!(
            "HTTP/1.1 {}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
            status,
            body.len(),
            body
        );
        socket.write_all(response.as_bytes()).await.unwrap();
        let _ = socket.shutdown().await;
        String::from_utf8_lossy(&head).to_lowercase()
    });
    (format!("http://{}", addr), handle)
}

#[tokio::test]
async fn test_get_with_query_and_bearer_token() {
    let (base, server) = serve_once("200 OK", r#"{"repos":["hub"]}"#).await;
    let connector = HttpConnector::new("github", base).with_token("tok-123", None);
    let credentials = connector.authenticate().await.unwrap();

    let options = RequestOptions::new()
        .with_param("org", json!("acme"))
        .with_header("x-trace", "abc");
    let value = connector.request("repos", &options, &credentials).await.unwrap();
    assert_eq!(value, json!({ "repos": ["hub"] }));

    let head = server.await.unwrap();
    assert!(head.starts_with("get /repos?org=acme http/1.1"));
    assert!(head.contains("authorization: bearer tok-123"));
    assert!(head.contains("x-trace: abc"));
}

#[tokio::test]
async fn test_error_status_maps_to_request_failed() {
    let (base, server) = serve_once("503 Service Unavailable", r#"{"error":"down"}"#).await;
    let connector = HttpConnector::new("ci", base);

    let err = connector
        .request("builds", &RequestOptions::new(), &Credentials::anonymous())
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(503));
    assert!(err.is_retryable());

    let head = server.await.unwrap();
    assert!(!head.contains("authorization"));
}

#[tokio::test]
async fn test_refused_connection_is_a_network_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let connector = HttpConnector::new("gone", format!("http://{}", addr));
    let err = connector
        .request("x", &RequestOptions::new(), &Credentials::anonymous())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Network(_)));
}

#[tokio::test]
async fn test_connection_dropped_mid_exchange_is_retryable() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut chunk = [0u8; 1024];
        let _ = socket.read(&mut chunk).await;
        drop(socket);
    });

    let connector = HttpConnector::new("flaky", format!("http://{}", addr));
    let err = connector
        .request("ping", &RequestOptions::new(), &Credentials::anonymous())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Network(_)), "unexpected error: {err:?}");
    assert!(err.is_retryable());
    server.await.unwrap();
}

#[tokio::test]
async fn test_health_probe_uses_configured_path() {
    let (base, server) = serve_once("200 OK", "ok").await;
    let connector = HttpConnector::new("registry", base).with_health_path("/healthz");

    let probe = connector.health_check().await.unwrap().unwrap();
    assert_eq!(probe, json!({ "status": 200 }));
    assert!(server.await.unwrap().starts_with("get /healthz http/1.1"));

    assert!(HttpConnector::new("plain", "http://127.0.0.1:9")
        .health_check()
        .await
        .is_none());
}

#[tokio::test]
async fn test_gateway_dispatches_to_http_backend() {
    let (base, server) = serve_once("200 OK", r#"{"items":2}"#).await;
    let gateway = ConnectorGateway::builder()
        .without_maintenance()
        .build()
        .await
        .unwrap();
    gateway
        .register_connector("jira", Arc::new(HttpConnector::new("jira", base)))
        .unwrap();

    let options = RequestOptions::new().with_param("project", json!("HUB"));
    let first = gateway.request("jira", "search", &options).await.unwrap();
    let second = gateway.request("jira", "search", &options).await.unwrap();

    assert_eq!(first, json!({ "items": 2 }));
    assert_eq!(first, second);
    assert!(server.await.unwrap().starts_with("get /search?project=hub"));
}
