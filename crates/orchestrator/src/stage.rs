//! Stage contract of the pipeline orchestrator.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use connector_hub_core::Result;

/// What a stage sees when it runs.
#[derive(Debug, Clone)]
pub struct StageContext {
    pub pipeline_id: String,
    pub description: String,
    /// Results of every stage that already completed, keyed by stage name.
    pub results: BTreeMap<String, Value>,
}

impl StageContext {
    /// Result of an earlier stage.
    pub fn result(&self, stage: &str) -> Option<&Value> {
        self.results.get(stage)
    }
}

/// Compensation for side effects of a completed stage.
#[async_trait]
pub trait CleanupHandle: Send + Sync {
    async fn cleanup(&self) -> Result<()>;
}

#[async_trait]
impl<F, Fut> CleanupHandle for F
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<()>> + Send,
{
    async fn cleanup(&self) -> Result<()> {
        (self)().await
    }
}

/// Value produced by a stage, plus an optional cleanup handle.
#[derive(Clone)]
pub struct StageOutput {
    pub value: Value,
    pub cleanup: Option<Arc<dyn CleanupHandle>>,
}

impl StageOutput {
    pub fn new(value: Value) -> Self {
        Self {
            value,
            cleanup: None,
        }
    }

    /// Attach a handle that can undo this stage's side effects.
    pub fn with_cleanup(mut self, cleanup: impl CleanupHandle + 'static) -> Self {
        self.cleanup = Some(Arc::new(cleanup));
        self
    }
}

impl From<Value> for StageOutput {
    fn from(value: Value) -> Self {
        Self::new(value)
    }
}

impl std::fmt::Debug for StageOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageOutput")
            .field("value", &self.value)
            .field("cleanup", &self.cleanup.is_some())
            .finish()
    }
}

/// One named step of a pipeline.
#[async_trait]
pub trait Stage: Send + Sync {
    fn name(&self) -> &str;

    async fn execute(&self, ctx: &StageContext) -> Result<StageOutput>;
}

/// Stage backed by an async closure.
pub struct FnStage<F> {
    name: String,
    run: F,
}

#[async_trait]
impl<F, Fut> Stage for FnStage<F>
where
    F: Fn(StageContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value>> + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, ctx: &StageContext) -> Result<StageOutput> {
        (self.run)(ctx.clone()).await.map(StageOutput::new)
    }
}

/// Build a stage from an async closure receiving a copy of the context.
pub fn stage<F, Fut>(name: impl Into<String>, run: F) -> FnStage<F>
where
    F: Fn(StageContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value>> + Send,
{
    FnStage {
        name: name.into(),
        run,
    }
}
