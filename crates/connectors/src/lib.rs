#![deny(unused)]
//! Connector implementations for Connector Hub.

pub mod http;

pub use http::HttpConnector;
