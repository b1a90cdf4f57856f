#![deny(unused)]
//! Connector Hub
//!
//! Boots the connector gateway with the HTTP connectors declared in the
//! configuration, runs a startup health pipeline and keeps the gateway's
//! maintenance running until interrupted.

use serde_json::json;
use std::sync::Arc;

use connector_hub_connectors::HttpConnector;
use connector_hub_core::config::AppConfig;
use connector_hub_core::{ConnectorOptions, HealthReport};
use connector_hub_gateway::ConnectorGateway;
use connector_hub_orchestrator::{Pipeline, PipelineOrchestrator, StageContext};
use connector_hub_store::config_store_from;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load()?;
    connector_hub_telemetry::configure_tracing(config.telemetry.json_logs)?;

    tracing::info!("Starting Connector Hub v{}", env!("CARGO_PKG_VERSION"));

    let _metrics = if config.telemetry.metrics_enabled {
        Some(connector_hub_telemetry::setup_metrics_recorder()?)
    } else {
        None
    };

    // =========================================================================
    // Gateway
    // =========================================================================
    let store = config_store_from(config.store.config_dir.as_deref());
    let gateway = ConnectorGateway::builder()
        .with_config(config.gateway.clone())
        .with_config_store(store)
        .build()
        .await?;

    gateway.subscribe(|event| {
        tracing::debug!(event = event.kind(), "Gateway event");
        Ok(())
    });

    for definition in &config.connectors {
        let connector = HttpConnector::from_config(definition);
        let options = ConnectorOptions {
            config: json!({ "baseUrl": definition.base_url }),
            rate_limit: definition.rate_limit,
        };
        gateway.register_connector_with(&definition.name, Arc::new(connector), options)?;
    }
    tracing::info!(
        connectors = config.connectors.len(),
        config = ?gateway.configuration(),
        "Connector gateway initialized"
    );

    // =========================================================================
    // Orchestrator
    // =========================================================================
    let orchestrator = PipelineOrchestrator::new(config.orchestrator.clone());
    orchestrator.subscribe(|event| {
        tracing::info!(
            event = event.event_type.as_str(),
            stage = ?event.stage,
            progress = event.task.progress,
            "Pipeline event"
        );
        Ok(())
    });

    let probe = gateway.clone();
    let startup = Pipeline::new("startup health sweep")
        .then("health", move |_| {
            let gateway = probe.clone();
            async move { Ok(serde_json::to_value(gateway.health_check_all().await)?) }
        })
        .then("summarize", |ctx: StageContext| async move {
            let reports: std::collections::BTreeMap<String, HealthReport> = ctx
                .result("health")
                .cloned()
                .map(serde_json::from_value)
                .transpose()?
                .unwrap_or_default();
            let unhealthy: Vec<&String> = reports
                .iter()
                .filter(|(_, r)| !r.is_healthy())
                .map(|(name, _)| name)
                .collect();
            Ok(json!({ "total": reports.len(), "unhealthy": unhealthy }))
        });

    match orchestrator.run(startup).await {
        Ok(record) => tracing::info!(summary = ?record.results.get("summarize"), "Startup health sweep finished"),
        Err(e) => tracing::warn!(error = %e, "Startup health sweep failed"),
    }

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down");
    gateway.shutdown();
    connector_hub_telemetry::shutdown_tracing();
    Ok(())
}
