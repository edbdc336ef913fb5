//! Execution state models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Overall pipeline execution status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionStatus {
    /// Pipeline has not started
    Pending,
    /// Pipeline is currently running
    Running,
    /// Every step succeeded
    Completed,
    /// A step failed and the remaining steps were not run
    Failed,
    /// The trigger did not match; nothing ran
    NotTriggered,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Pending => "Pending",
            ExecutionStatus::Running => "Running",
            ExecutionStatus::Completed => "Completed",
            ExecutionStatus::Failed => "Failed",
            ExecutionStatus::NotTriggered => "NotTriggered",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Pending" => Some(ExecutionStatus::Pending),
            "Running" => Some(ExecutionStatus::Running),
            "Completed" => Some(ExecutionStatus::Completed),
            "Failed" => Some(ExecutionStatus::Failed),
            "NotTriggered" => Some(ExecutionStatus::NotTriggered),
            _ => None,
        }
    }
}

/// State of a single step: Pending → Running → {Succeeded, Failed, TimedOut}
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepState {
    /// Step has not started (and, after a failure, never will)
    Pending,
    /// Step process is running
    Running {
        started_at: DateTime<Utc>,
    },
    /// Process exited with status 0
    Succeeded {
        exit_code: i32,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
    },
    /// Binding, launch or process failure
    Failed {
        error: String,
        exit_code: Option<i32>,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
    },
    /// Deadline elapsed and the process was killed
    TimedOut {
        timeout_secs: u64,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
    },
}

impl StepState {
    /// Check if step is in a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StepState::Succeeded { .. } | StepState::Failed { .. } | StepState::TimedOut { .. }
        )
    }

    /// Terminal failure state, keeping the start time of a running step
    pub fn fail(&self, error: String, exit_code: Option<i32>) -> StepState {
        let finished_at = Utc::now();
        let started_at = match self {
            StepState::Running { started_at } => *started_at,
            _ => finished_at,
        };
        StepState::Failed {
            error,
            exit_code,
            started_at,
            finished_at,
        }
    }

    /// Short label used in output and persistence
    pub fn label(&self) -> &'static str {
        match self {
            StepState::Pending => "Pending",
            StepState::Running { .. } => "Running",
            StepState::Succeeded { .. } => "Succeeded",
            StepState::Failed { .. } => "Failed",
            StepState::TimedOut { .. } => "TimedOut",
        }
    }
}

/// Overall pipeline state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineState {
    /// Unique execution ID
    pub execution_id: Uuid,

    /// Current execution status
    pub status: ExecutionStatus,

    /// When execution started
    pub started_at: Option<DateTime<Utc>>,

    /// When execution completed/failed
    pub completed_at: Option<DateTime<Utc>>,

    /// Total number of steps
    pub total_steps: usize,

    /// Number of succeeded steps
    pub completed_steps: usize,

    /// Index of the step that halted the run
    pub failed_step: Option<usize>,
}

impl PipelineState {
    /// Create a new pipeline state
    pub fn new() -> Self {
        Self {
            execution_id: Uuid::new_v4(),
            status: ExecutionStatus::Pending,
            started_at: None,
            completed_at: None,
            total_steps: 0,
            completed_steps: 0,
            failed_step: None,
        }
    }

    /// Mark pipeline as started
    pub fn start(&mut self, total_steps: usize) {
        self.status = ExecutionStatus::Running;
        self.started_at = Some(Utc::now());
        self.total_steps = total_steps;
    }

    /// Record a succeeded step
    pub fn step_succeeded(&mut self) {
        self.completed_steps += 1;
    }

    /// Mark pipeline as completed
    pub fn complete(&mut self) {
        self.status = ExecutionStatus::Completed;
        self.completed_at = Some(Utc::now());
    }

    /// Mark pipeline as failed at `index`
    pub fn fail(&mut self, index: usize) {
        self.status = ExecutionStatus::Failed;
        self.failed_step = Some(index);
        self.completed_at = Some(Utc::now());
    }

    /// Mark pipeline as skipped by its trigger
    pub fn not_triggered(&mut self) {
        let now = Utc::now();
        self.status = ExecutionStatus::NotTriggered;
        self.started_at = Some(now);
        self.completed_at = Some(now);
    }

    /// Calculate progress percentage (0.0 to 1.0)
    pub fn progress(&self) -> f64 {
        if self.total_steps == 0 {
            return 0.0;
        }
        self.completed_steps as f64 / self.total_steps as f64
    }
}

impl Default for PipelineState {
    fn default() -> Self {
        Self::new()
    }
}
