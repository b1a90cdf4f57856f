#![deny(unused)]
//! Logging, tracing and metrics setup for Connector Hub binaries.

pub mod metrics;
pub mod tracing_layer;

pub use self::metrics::{describe_metrics, setup_metrics_recorder};
pub use self::tracing_layer::{configure_tracing, shutdown_tracing};
