#![deny(unused)]
//! Core types, traits, and error definitions for Connector Hub.
//!
//! This crate provides the building blocks shared by the gateway, the
//! pipeline orchestrator and every connector implementation.

pub mod config;
pub mod error;
pub mod events;
pub mod mocks;
pub mod traits;
pub mod types;

pub use error::{Error, Result};
pub use events::*;
pub use traits::*;
pub use types::*;
