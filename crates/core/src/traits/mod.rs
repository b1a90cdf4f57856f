//! Core traits for Connector Hub.
//!
//! - `connector`: the capability contract every backend adapter implements
//! - `config_store`: key-value persistence for gateway configuration
//! - `events`: listeners attached to an [`crate::events::EventBus`]

pub mod config_store;
pub mod connector;
pub mod events;

pub use config_store::*;
pub use connector::*;
pub use events::*;
