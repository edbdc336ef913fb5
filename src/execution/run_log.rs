//! Ordered, append-only record of executed steps

use crate::core::StepState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome of one executed step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunResult {
    /// Position of the step in the pipeline
    pub index: usize,
    pub step_id: String,
    pub step_name: String,
    /// Terminal state of the step
    pub state: StepState,
    /// `None` when the process never produced an exit status
    pub exit_code: Option<i32>,
    /// Captured stdout, secrets redacted
    pub stdout: String,
    /// Captured stderr, secrets redacted
    pub stderr: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunResult {
    pub fn succeeded(&self) -> bool {
        matches!(self.state, StepState::Succeeded { .. })
    }

    /// Wall-clock duration of the step
    pub fn duration(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }
}

/// Results in execution order. Entries cannot be changed once appended.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunLog {
    results: Vec<RunResult>,
}

impl RunLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, result: RunResult) {
        self.results.push(result);
    }

    pub fn results(&self) -> &[RunResult] {
        &self.results
    }

    pub fn get(&self, step_id: &str) -> Option<&RunResult> {
        self.results.iter().find(|r| r.step_id == step_id)
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Ids of the executed steps, in order
    pub fn executed_steps(&self) -> Vec<&str> {
        self.results.iter().map(|r| r.step_id.as_str()).collect()
    }

    /// Exit codes in execution order
    pub fn exit_codes(&self) -> Vec<Option<i32>> {
        self.results.iter().map(|r| r.exit_code).collect()
    }
}
