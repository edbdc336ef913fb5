//! Persistence layer for pipeline execution history

#[cfg(feature = "sqlite")]
pub mod store;

#[cfg(feature = "sqlite")]
pub use store::SqliteExecutionStore;

pub use crate::core::ExecutionStatus;
use crate::execution::RunOutcome;
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Recorded outcome of one step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepSummary {
    pub index: usize,
    pub step_id: String,
    /// Terminal state label, e.g. `Succeeded`
    pub state: String,
    pub exit_code: Option<i32>,
    pub duration_ms: i64,
}

/// Summary of a pipeline execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionSummary {
    /// Unique execution ID
    pub execution_id: Uuid,

    /// Pipeline name
    pub pipeline_name: String,

    /// Branch that triggered the run
    pub branch: Option<String>,

    /// Execution status
    pub status: ExecutionStatus,

    /// When execution started
    pub started_at: DateTime<Utc>,

    /// When execution completed (if complete)
    pub completed_at: Option<DateTime<Utc>>,

    /// Progress (0.0 to 1.0)
    pub progress: f64,

    /// Number of completed steps
    pub completed_steps: usize,

    /// Total number of steps
    pub total_steps: usize,

    /// Index of the step that halted the run
    pub failed_step: Option<usize>,

    /// Error of the failing step
    pub error: Option<String>,

    /// Keys of published artifacts
    pub artifacts: Vec<String>,

    /// Executed steps, in order
    pub steps: Vec<StepSummary>,
}

/// Trait for persistence backends
#[async_trait::async_trait]
pub trait PersistenceBackend: Send + Sync {
    /// Save a pipeline execution
    async fn save_execution(&self, execution: &ExecutionSummary) -> Result<()>;

    /// Load an execution by ID
    async fn load_execution(&self, execution_id: Uuid) -> Result<Option<ExecutionSummary>>;

    /// List all executions for a pipeline, newest first
    async fn list_executions(&self, pipeline_name: &str) -> Result<Vec<ExecutionSummary>>;

    /// List all pipeline names
    async fn list_pipelines(&self) -> Result<Vec<String>>;
}

/// In-memory persistence (for testing or ephemeral use)
#[derive(Default)]
pub struct InMemoryPersistence {
    executions: RwLock<HashMap<Uuid, ExecutionSummary>>,
    by_pipeline: RwLock<HashMap<String, Vec<Uuid>>>,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl PersistenceBackend for InMemoryPersistence {
    async fn save_execution(&self, execution: &ExecutionSummary) -> Result<()> {
        let mut execs = self.executions.write().await;
        let replaced = execs
            .insert(execution.execution_id, execution.clone())
            .is_some();

        if !replaced {
            let mut by_pipeline = self.by_pipeline.write().await;
            by_pipeline
                .entry(execution.pipeline_name.clone())
                .or_default()
                .push(execution.execution_id);
        }

        Ok(())
    }

    async fn load_execution(&self, execution_id: Uuid) -> Result<Option<ExecutionSummary>> {
        let execs = self.executions.read().await;
        Ok(execs.get(&execution_id).cloned())
    }

    async fn list_executions(&self, pipeline_name: &str) -> Result<Vec<ExecutionSummary>> {
        let execs = self.executions.read().await;
        let by_pipeline = self.by_pipeline.read().await;

        let mut result: Vec<ExecutionSummary> = by_pipeline
            .get(pipeline_name)
            .map(|ids| ids.iter().filter_map(|id| execs.get(id).cloned()).collect())
            .unwrap_or_default();
        result.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(result)
    }

    async fn list_pipelines(&self) -> Result<Vec<String>> {
        let by_pipeline = self.by_pipeline.read().await;
        let mut names: Vec<String> = by_pipeline.keys().cloned().collect();
        names.sort();
        Ok(names)
    }
}

/// Create a summary from a finished run
pub fn create_summary(outcome: &RunOutcome) -> ExecutionSummary {
    let state = &outcome.state;
    ExecutionSummary {
        execution_id: state.execution_id,
        pipeline_name: outcome.pipeline_name.clone(),
        branch: outcome.branch.clone(),
        status: state.status,
        started_at: state.started_at.unwrap_or_else(Utc::now),
        completed_at: state.completed_at,
        progress: state.progress(),
        completed_steps: state.completed_steps,
        total_steps: state.total_steps,
        failed_step: state.failed_step,
        error: outcome.failure.as_ref().map(|f| f.error.to_string()),
        artifacts: outcome.artifacts.iter().map(|a| a.key.clone()).collect(),
        steps: outcome
            .run_log
            .results()
            .iter()
            .map(|r| StepSummary {
                index: r.index,
                step_id: r.step_id.clone(),
                state: r.state.label().to_string(),
                exit_code: r.exit_code,
                duration_ms: r.duration().num_milliseconds(),
            })
            .collect(),
    }
}
