//! Pipeline execution: binding, invocation and sequencing

pub mod binder;
pub mod engine;
pub mod error;
pub mod invoker;
pub mod run_log;

pub use binder::{BoundStep, EnvironmentBinder, PlannedStep, ResolvedCommand};
pub use engine::{ExecutionEngine, ExecutionEvent, RunOutcome, StepFailure};
pub use error::StepError;
pub use invoker::{InvokeError, ProcessInvoker, ProcessOutput, SubprocessInvoker};
pub use run_log::{RunLog, RunResult};
