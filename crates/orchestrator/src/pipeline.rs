//! Pipeline and stage records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;

/// Status of one stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

/// Status of a pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineStatus {
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl PipelineStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Processing)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

/// One stage as it ran.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageRecord {
    pub name: String,
    pub status: StageStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<u64>,
    pub result: Option<Value>,
    pub error: Option<String>,
}

/// Full state of a pipeline run.
///
/// `stages` only lists stages that have begun; `total_stages` counts the
/// declared ones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineRecord {
    pub id: String,
    pub description: String,
    pub status: PipelineStatus,
    pub stages: Vec<StageRecord>,
    pub total_stages: usize,
    pub results: BTreeMap<String, Value>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl PipelineRecord {
    pub(crate) fn new(id: String, description: String, total_stages: usize) -> Self {
        Self {
            id,
            description,
            status: PipelineStatus::Processing,
            stages: Vec::with_capacity(total_stages),
            total_stages,
            results: BTreeMap::new(),
            started_at: Utc::now(),
            completed_at: None,
            error: None,
        }
    }

    /// Completed stages as a percentage of declared stages.
    pub fn progress(&self) -> u8 {
        if self.total_stages == 0 {
            return 100;
        }
        let done = self
            .stages
            .iter()
            .filter(|s| s.status == StageStatus::Completed)
            .count();
        (done * 100 / self.total_stages) as u8
    }

    pub fn stage(&self, name: &str) -> Option<&StageRecord> {
        self.stages.iter().find(|s| s.name == name)
    }

    pub fn summary(&self) -> PipelineSummary {
        PipelineSummary {
            id: self.id.clone(),
            description: self.description.clone(),
            status: self.status,
            progress: self.progress(),
            started_at: self.started_at,
        }
    }

    pub(crate) fn begin_stage(&mut self, name: &str) {
        self.stages.push(StageRecord {
            name: name.to_string(),
            status: StageStatus::Pending,
            started_at: Utc::now(),
            completed_at: None,
            duration_ms: None,
            result: None,
            error: None,
        });
        if let Some(stage) = self.stages.last_mut() {
            stage.status = StageStatus::Running;
        }
    }

    pub(crate) fn complete_stage(&mut self, value: Value, elapsed: Duration) {
        if let Some(stage) = self.stages.last_mut() {
            stage.status = StageStatus::Completed;
            stage.completed_at = Some(Utc::now());
            stage.duration_ms = Some(elapsed.as_millis() as u64);
            stage.result = Some(value.clone());
            self.results.insert(stage.name.clone(), value);
        }
    }

    pub(crate) fn fail_stage(&mut self, error: &str, elapsed: Duration) {
        if let Some(stage) = self.stages.last_mut() {
            stage.status = StageStatus::Failed;
            stage.completed_at = Some(Utc::now());
            stage.duration_ms = Some(elapsed.as_millis() as u64);
            stage.error = Some(error.to_string());
        }
    }

    pub(crate) fn finish(&mut self, status: PipelineStatus, error: Option<String>) {
        self.status = status;
        self.completed_at = Some(Utc::now());
        self.error = error;
    }
}

/// Listing entry for a pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineSummary {
    pub id: String,
    pub description: String,
    pub status: PipelineStatus,
    pub progress: u8,
    pub started_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_progress_counts_completed_stages() {
        let mut record = PipelineRecord::new("p".into(), "deploy".into(), 4);
        assert_eq!(record.progress(), 0);

        record.begin_stage("build");
        record.complete_stage(json!("ok"), Duration::from_millis(5));
        record.begin_stage("test");
        assert_eq!(record.progress(), 25);
        assert_eq!(record.stage("test").unwrap().status, StageStatus::Running);

        record.fail_stage("boom", Duration::ZERO);
        record.finish(PipelineStatus::Failed, Some("boom".into()));
        assert_eq!(record.progress(), 25);
        assert_eq!(record.results.len(), 1);
        assert!(record.status.is_terminal());
        assert_eq!(record.summary().status, PipelineStatus::Failed);
    }
}
