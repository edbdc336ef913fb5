//! branchline - branch-triggered build, test and publish pipelines

pub mod cli;
pub mod core;
pub mod execution;
pub mod persistence;

// Re-export commonly used types
pub use core::{ExecutionContext, ExecutionStatus, PipelineDefinition, Step, StepState, TriggerEvent};
pub use execution::{ExecutionEngine, ExecutionEvent, ProcessInvoker, RunOutcome, StepError, SubprocessInvoker};
