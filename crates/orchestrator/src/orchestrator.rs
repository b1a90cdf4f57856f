//! Sequential pipeline executor with cancellation and bounded history.

use futures::FutureExt;
use serde_json::Value;
use std::collections::{HashMap, HashSet, VecDeque};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::time::Instant;
use uuid::Uuid;

use connector_hub_core::config::OrchestratorConfig;
use connector_hub_core::{Error, EventBus, ListenerId, Result};

use crate::events::{PipelineEvent, PipelineEventType};
use crate::pipeline::{PipelineRecord, PipelineStatus, PipelineSummary};
use crate::stage::{stage, CleanupHandle, Stage, StageContext};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// =============================================================================
// Pipeline definition
// =============================================================================

/// Ordered list of stages plus a description.
pub struct Pipeline {
    description: String,
    stages: Vec<Arc<dyn Stage>>,
}

impl Pipeline {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            stages: Vec::new(),
        }
    }

    /// Append a stage.
    pub fn stage(mut self, stage: impl Stage + 'static) -> Self {
        self.stages.push(Arc::new(stage));
        self
    }

    /// Append a stage built from an async closure.
    pub fn then<F, Fut>(self, name: impl Into<String>, run: F) -> Self
    where
        F: Fn(StageContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        self.stage(stage(name, run))
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

fn validate_stages(stages: &[Arc<dyn Stage>]) -> Result<()> {
    if stages.is_empty() {
        return Err(Error::InvalidPipeline("a pipeline needs at least one stage".into()));
    }
    let mut seen = HashSet::new();
    for stage in stages {
        let name = stage.name();
        if name.is_empty() {
            return Err(Error::InvalidPipeline("stage names must not be empty".into()));
        }
        if !seen.insert(name) {
            return Err(Error::InvalidPipeline(format!("duplicate stage name '{}'", name)));
        }
    }
    Ok(())
}

// =============================================================================
// Orchestrator
// =============================================================================

struct ActivePipeline {
    record: PipelineRecord,
    cancel_requested: bool,
}

/// Outcome of [`PipelineOrchestrator::run_cleanup`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    /// Stages whose cleanup succeeded, in the order they ran.
    pub completed: Vec<String>,
    /// Stages whose cleanup failed, with the error.
    pub failed: Vec<(String, String)>,
}

/// Runs one pipeline at a time and keeps the most recent terminal runs.
pub struct PipelineOrchestrator {
    active: Mutex<Option<ActivePipeline>>,
    history: Mutex<VecDeque<PipelineRecord>>,
    cleanups: Mutex<HashMap<String, Vec<(String, Arc<dyn CleanupHandle>)>>>,
    events: Arc<EventBus<PipelineEvent>>,
    history_limit: usize,
}

/// Marks the run cancelled if `start_pipeline` is dropped mid-flight.
struct RunGuard<'a> {
    orchestrator: &'a PipelineOrchestrator,
    id: String,
    armed: bool,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.orchestrator
                .abandon(&self.id, "pipeline run was dropped before completion");
        }
    }
}

impl Default for PipelineOrchestrator {
    fn default() -> Self {
        Self::new(OrchestratorConfig::default())
    }
}

impl PipelineOrchestrator {
    pub fn new(config: OrchestratorConfig) -> Self {
        Self::with_event_bus(config, Arc::new(EventBus::new()))
    }

    pub fn with_event_bus(config: OrchestratorConfig, events: Arc<EventBus<PipelineEvent>>) -> Self {
        Self {
            active: Mutex::new(None),
            history: Mutex::new(VecDeque::new()),
            cleanups: Mutex::new(HashMap::new()),
            events,
            history_limit: config.history_limit.max(1),
        }
    }

    // -------------------------------------------------------------------------
    // Events
    // -------------------------------------------------------------------------

    pub fn events(&self) -> Arc<EventBus<PipelineEvent>> {
        self.events.clone()
    }

    pub fn subscribe(
        &self,
        listener: impl Fn(&PipelineEvent) -> Result<()> + Send + Sync + 'static,
    ) -> ListenerId {
        self.events.subscribe(listener)
    }

    pub fn subscribe_channel(&self) -> tokio::sync::mpsc::UnboundedReceiver<PipelineEvent> {
        self.events.subscribe_channel()
    }

    // -------------------------------------------------------------------------
    // Execution
    // -------------------------------------------------------------------------

    /// Run `pipeline` to completion.
    pub async fn run(&self, pipeline: Pipeline) -> Result<PipelineRecord> {
        self.start_pipeline(&pipeline.description, pipeline.stages)
            .await
    }

    /// Execute `stages` strictly in order.
    ///
    /// Each stage sees the results of every stage before it. The first failure
    /// ends the run with `StageFailed`; a cancellation request is honoured
    /// before the next stage starts. The terminal record is moved to history.
    #[tracing::instrument(skip_all, fields(description = %description))]
    pub async fn start_pipeline(
        &self,
        description: &str,
        stages: Vec<Arc<dyn Stage>>,
    ) -> Result<PipelineRecord> {
        validate_stages(&stages)?;
        let id = Uuid::new_v4().to_string();

        let started = {
            let mut slot = lock(&self.active);
            if let Some(current) = slot.as_ref() {
                return Err(Error::PipelineBusy(current.record.id.clone()));
            }
            let record = PipelineRecord::new(id.clone(), description.to_string(), stages.len());
            let summary = record.summary();
            *slot = Some(ActivePipeline {
                record,
                cancel_requested: false,
            });
            summary
        };
        let mut guard = RunGuard {
            orchestrator: self,
            id: id.clone(),
            armed: true,
        };

        tracing::info!(pipeline_id = %id, stages = stages.len(), "Pipeline started");
        self.events
            .emit(&PipelineEvent::new(PipelineEventType::PipelineStarted, started));

        for stage in &stages {
            let name = stage.name().to_string();

            let begun = {
                let mut slot = lock(&self.active);
                match slot.as_mut() {
                    Some(active) if active.record.id == id => {
                        if active.cancel_requested {
                            None
                        } else {
                            active.record.begin_stage(&name);
                            let ctx = StageContext {
                                pipeline_id: id.clone(),
                                description: description.to_string(),
                                results: active.record.results.clone(),
                            };
                            Some((ctx, active.record.summary()))
                        }
                    }
                    _ => {
                        return Err(Error::internal(format!(
                            "pipeline {} lost its active slot",
                            id
                        )))
                    }
                }
            };
            let Some((ctx, summary)) = begun else {
                guard.armed = false;
                return Err(self.cancel_now(&id));
            };

            tracing::info!(pipeline_id = %id, stage = %name, "Stage started");
            self.events.emit(
                &PipelineEvent::new(PipelineEventType::StageStarted, summary).stage(&name),
            );

            let clock = Instant::now();
            let outcome = AssertUnwindSafe(stage.execute(&ctx))
                .catch_unwind()
                .await
                .unwrap_or_else(|_| Err(Error::internal(format!("stage '{}' panicked", name))));
            let elapsed = clock.elapsed();

            match outcome {
                Ok(output) => {
                    if let Some(cleanup) = output.cleanup {
                        lock(&self.cleanups)
                            .entry(id.clone())
                            .or_default()
                            .push((name.clone(), cleanup));
                    }
                    let value = output.value;
                    metrics::counter!("pipeline_stages_total", "status" => "completed").increment(1);
                    tracing::info!(
                        pipeline_id = %id,
                        stage = %name,
                        duration_ms = elapsed.as_millis() as u64,
                        "Stage completed"
                    );
                    if let Some(summary) =
                        self.update_active(&id, |r| r.complete_stage(value.clone(), elapsed))
                    {
                        self.events.emit(
                            &PipelineEvent::new(PipelineEventType::StageCompleted, summary)
                                .stage(&name)
                                .result(value),
                        );
                    }
                }
                Err(e) => {
                    let message = e.to_string();
                    metrics::counter!("pipeline_stages_total", "status" => "failed").increment(1);
                    tracing::error!(pipeline_id = %id, stage = %name, error = %message, "Stage failed");
                    if let Some(summary) = self.update_active(&id, |r| r.fail_stage(&message, elapsed)) {
                        self.events.emit(
                            &PipelineEvent::new(PipelineEventType::StageFailed, summary)
                                .stage(&name)
                                .error(message.clone()),
                        );
                    }

                    guard.armed = false;
                    if let Some(record) = self.finish(&id, PipelineStatus::Failed, Some(message.clone())) {
                        self.events.emit(
                            &PipelineEvent::new(PipelineEventType::PipelineFailed, record.summary())
                                .stage(&name)
                                .error(message),
                        );
                    }
                    return Err(Error::stage_failed(name, e));
                }
            }
        }

        guard.armed = false;
        let record = self
            .finish(&id, PipelineStatus::Completed, None)
            .ok_or_else(|| Error::internal(format!("pipeline {} lost its active slot", id)))?;
        tracing::info!(pipeline_id = %id, "Pipeline completed");
        let results = Value::Object(record.results.clone().into_iter().collect());
        self.events.emit(
            &PipelineEvent::new(PipelineEventType::PipelineCompleted, record.summary())
                .result(results),
        );
        Ok(record)
    }

    fn update_active(
        &self,
        id: &str,
        apply: impl FnOnce(&mut PipelineRecord),
    ) -> Option<PipelineSummary> {
        let mut slot = lock(&self.active);
        let active = slot.as_mut().filter(|a| a.record.id == id)?;
        apply(&mut active.record);
        Some(active.record.summary())
    }

    /// Move the active run `id` into history.
    fn finish(&self, id: &str, status: PipelineStatus, error: Option<String>) -> Option<PipelineRecord> {
        let mut record = {
            let mut slot = lock(&self.active);
            if slot.as_ref().map(|a| a.record.id.as_str()) != Some(id) {
                return None;
            }
            slot.take()?.record
        };
        record.finish(status, error);
        metrics::counter!("pipeline_runs_total", "status" => status.as_str()).increment(1);

        let evicted: Vec<String> = {
            let mut history = lock(&self.history);
            history.push_back(record.clone());
            let mut evicted = Vec::new();
            while history.len() > self.history_limit {
                if let Some(old) = history.pop_front() {
                    evicted.push(old.id);
                }
            }
            evicted
        };
        if !evicted.is_empty() {
            let mut cleanups = lock(&self.cleanups);
            for old in &evicted {
                cleanups.remove(old);
            }
        }
        Some(record)
    }

    fn cancel_now(&self, id: &str) -> Error {
        if let Some(record) = self.finish(
            id,
            PipelineStatus::Cancelled,
            Some("cancelled by request".into()),
        ) {
            tracing::info!(pipeline_id = %id, completed_stages = record.stages.len(), "Pipeline cancelled");
            self.events.emit(&PipelineEvent::new(
                PipelineEventType::PipelineCancelled,
                record.summary(),
            ));
        }
        Error::PipelineCancelled(id.to_string())
    }

    fn abandon(&self, id: &str, reason: &str) {
        if let Some(record) = self.finish(id, PipelineStatus::Cancelled, Some(reason.to_string())) {
            tracing::warn!(pipeline_id = %id, reason, "Pipeline abandoned");
            self.events.emit(
                &PipelineEvent::new(PipelineEventType::PipelineCancelled, record.summary())
                    .error(reason),
            );
        }
    }

    // -------------------------------------------------------------------------
    // Cancellation and cleanup
    // -------------------------------------------------------------------------

    /// Request cancellation of the active pipeline, if any.
    pub fn cancel(&self) -> bool {
        match lock(&self.active).as_mut() {
            Some(active) => {
                active.cancel_requested = true;
                tracing::info!(pipeline_id = %active.record.id, "Cancellation requested");
                true
            }
            None => false,
        }
    }

    /// Request cancellation of pipeline `id` if it is the active one.
    pub fn cancel_pipeline(&self, id: &str) -> bool {
        match lock(&self.active).as_mut() {
            Some(active) if active.record.id == id => {
                active.cancel_requested = true;
                tracing::info!(pipeline_id = %id, "Cancellation requested");
                true
            }
            _ => false,
        }
    }

    /// Run the cleanup handles of a terminal pipeline, last stage first.
    ///
    /// Handles run at most once. Failures are logged and reported; the
    /// remaining handles still run.
    pub async fn run_cleanup(&self, id: &str) -> Result<CleanupReport> {
        if self.is_active(id) {
            return Err(Error::PipelineBusy(id.to_string()));
        }
        if self.get(id).is_none() {
            return Err(Error::not_found(id));
        }

        let handles = lock(&self.cleanups).remove(id).unwrap_or_default();
        let mut report = CleanupReport::default();
        for (stage, handle) in handles.into_iter().rev() {
            match handle.cleanup().await {
                Ok(()) => {
                    tracing::info!(pipeline_id = %id, stage = %stage, "Cleanup completed");
                    report.completed.push(stage);
                }
                Err(e) => {
                    tracing::warn!(pipeline_id = %id, stage = %stage, error = %e, "Cleanup failed");
                    report.failed.push((stage, e.to_string()));
                }
            }
        }
        Ok(report)
    }

    // -------------------------------------------------------------------------
    // Queries
    // -------------------------------------------------------------------------

    fn is_active(&self, id: &str) -> bool {
        lock(&self.active)
            .as_ref()
            .is_some_and(|a| a.record.id == id)
    }

    pub fn is_busy(&self) -> bool {
        lock(&self.active).is_some()
    }

    /// Snapshot of the running pipeline.
    pub fn active(&self) -> Option<PipelineRecord> {
        lock(&self.active).as_ref().map(|a| a.record.clone())
    }

    /// Active or historical pipeline `id`.
    pub fn get(&self, id: &str) -> Option<PipelineRecord> {
        if let Some(active) = lock(&self.active).as_ref().filter(|a| a.record.id == id) {
            return Some(active.record.clone());
        }
        lock(&self.history).iter().find(|r| r.id == id).cloned()
    }

    /// Terminal pipelines, oldest first.
    pub fn history(&self) -> Vec<PipelineRecord> {
        lock(&self.history).iter().cloned().collect()
    }

    /// The active pipeline followed by history, newest first.
    pub fn list(&self) -> Vec<PipelineSummary> {
        let mut out: Vec<PipelineSummary> = self.active().iter().map(|r| r.summary()).collect();
        out.extend(lock(&self.history).iter().rev().map(|r| r.summary()));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_stage_list_is_validated() {
        let empty: Vec<Arc<dyn Stage>> = Vec::new();
        assert!(matches!(validate_stages(&empty), Err(Error::InvalidPipeline(_))));

        let dup = Pipeline::new("dup")
            .then("a", |_| async { Ok(json!(1)) })
            .then("a", |_| async { Ok(json!(2)) });
        assert!(matches!(validate_stages(&dup.stages), Err(Error::InvalidPipeline(_))));
    }

    #[tokio::test]
    async fn test_history_is_bounded() {
        let orchestrator = PipelineOrchestrator::new(OrchestratorConfig { history_limit: 2 });
        for i in 0..3 {
            orchestrator
                .run(Pipeline::new(format!("run {i}")).then("only", |_| async { Ok(json!(null)) }))
                .await
                .unwrap();
        }

        let history = orchestrator.history();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].description, "run 1");
        assert_eq!(history[1].description, "run 2");
        assert_eq!(orchestrator.list()[0].description, "run 2");
    }
}
