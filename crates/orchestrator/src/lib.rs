#![deny(unused)]
//! Pipeline orchestrator for Connector Hub.
//!
//! Runs an ordered list of named stages for one unit of work, threads each
//! stage's result into the next, and reports progress only through
//! [`PipelineEvent`]s.

pub mod events;
pub mod orchestrator;
pub mod pipeline;
pub mod stage;

pub use events::{PipelineEvent, PipelineEventType};
pub use orchestrator::{CleanupReport, Pipeline, PipelineOrchestrator};
pub use pipeline::{PipelineRecord, PipelineStatus, PipelineSummary, StageRecord, StageStatus};
pub use stage::{stage, CleanupHandle, FnStage, Stage, StageContext, StageOutput};
