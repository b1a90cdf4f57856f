//! Orchestrator lifecycle events.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::pipeline::PipelineSummary;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PipelineEventType {
    PipelineStarted,
    StageStarted,
    StageCompleted,
    StageFailed,
    PipelineCompleted,
    PipelineFailed,
    PipelineCancelled,
}

impl PipelineEventType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PipelineStarted => "pipeline-started",
            Self::StageStarted => "stage-started",
            Self::StageCompleted => "stage-completed",
            Self::StageFailed => "stage-failed",
            Self::PipelineCompleted => "pipeline-completed",
            Self::PipelineFailed => "pipeline-failed",
            Self::PipelineCancelled => "pipeline-cancelled",
        }
    }

    pub fn is_stage_event(self) -> bool {
        matches!(
            self,
            Self::StageStarted | Self::StageCompleted | Self::StageFailed
        )
    }
}

/// Progress notification; `task` is a snapshot of the pipeline at emission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineEvent {
    #[serde(rename = "type")]
    pub event_type: PipelineEventType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
    pub task: PipelineSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PipelineEvent {
    pub(crate) fn new(event_type: PipelineEventType, task: PipelineSummary) -> Self {
        Self {
            event_type,
            stage: None,
            task,
            result: None,
            error: None,
        }
    }

    pub(crate) fn stage(mut self, name: &str) -> Self {
        self.stage = Some(name.to_string());
        self
    }

    pub(crate) fn result(mut self, value: Value) -> Self {
        self.result = Some(value);
        self
    }

    pub(crate) fn error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}
