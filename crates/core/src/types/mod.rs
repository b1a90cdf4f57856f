//! Core type definitions for Connector Hub.
//!
//! Data exchanged between callers, the gateway and connectors.

pub mod auth;
pub mod connector;
pub mod health;
pub mod request;

pub use auth::*;
pub use connector::*;
pub use health::*;
pub use request::*;
