//! Main execution engine - runs a pipeline's steps strictly in order

use crate::{
    core::{ExecutionContext, ExecutionStatus, PipelineDefinition, PipelineState, Publish, Step, StepState, TriggerEvent},
    execution::{
        binder::EnvironmentBinder,
        error::StepError,
        invoker::{InvokeError, ProcessInvoker, ProcessOutput},
        run_log::{RunLog, RunResult},
    },
};
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Events that can occur during pipeline execution
#[derive(Debug, Clone)]
pub enum ExecutionEvent {
    PipelineStarted {
        execution_id: Uuid,
        pipeline_name: String,
        total_steps: usize,
    },
    PipelineNotTriggered {
        pipeline_name: String,
        branch: Option<String>,
    },
    StepStarted {
        index: usize,
        step_id: String,
        /// Resolved command line, secrets redacted
        command: String,
    },
    StepSucceeded {
        index: usize,
        step_id: String,
        output: String,
    },
    StepFailed {
        index: usize,
        step_id: String,
        error: String,
        output: String,
    },
    StepSkipped {
        index: usize,
        step_id: String,
    },
    ArtifactPublished {
        step_id: String,
        file: String,
        key: String,
    },
    PipelineCompleted {
        execution_id: Uuid,
        status: ExecutionStatus,
    },
}

/// Type for event handlers
pub type EventHandler = Arc<dyn Fn(ExecutionEvent) + Send + Sync>;

/// The step that halted a run
#[derive(Debug)]
pub struct StepFailure {
    pub index: usize,
    pub step_id: String,
    pub error: StepError,
}

/// Everything a finished run produced
#[derive(Debug)]
pub struct RunOutcome {
    pub pipeline_name: String,
    pub branch: Option<String>,
    pub state: PipelineState,
    pub run_log: RunLog,
    /// Final state of every step, in declaration order; steps that never
    /// started stay `Pending`
    pub step_states: Vec<StepState>,
    pub failure: Option<StepFailure>,
    /// Steps that never ran because an earlier one failed
    pub skipped: Vec<String>,
    pub artifacts: Vec<Publish>,
    /// Variables captured from step output during the run
    pub captured: BTreeMap<String, String>,
}

impl RunOutcome {
    pub fn execution_id(&self) -> Uuid {
        self.state.execution_id
    }

    pub fn status(&self) -> ExecutionStatus {
        self.state.status
    }

    pub fn is_success(&self) -> bool {
        self.state.status == ExecutionStatus::Completed
    }

    /// Did the run fail? A trigger mismatch is not a failure.
    pub fn is_failure(&self) -> bool {
        self.state.status == ExecutionStatus::Failed
    }

    /// Index of the failing step
    pub fn failed_index(&self) -> Option<usize> {
        self.failure.as_ref().map(|f| f.index)
    }
}

/// Main pipeline execution engine
pub struct ExecutionEngine<I> {
    invoker: I,
    binder: EnvironmentBinder,
    event_handlers: Vec<EventHandler>,
}

impl<I: ProcessInvoker> ExecutionEngine<I> {
    pub fn new(invoker: I) -> Self {
        Self {
            invoker,
            binder: EnvironmentBinder::new(),
            event_handlers: Vec::new(),
        }
    }

    /// The invoker steps are run with
    pub fn invoker(&self) -> &I {
        &self.invoker
    }

    /// Add an event handler
    pub fn add_event_handler<F>(&mut self, handler: F)
    where
        F: Fn(ExecutionEvent) + Send + Sync + 'static,
    {
        self.event_handlers.push(Arc::new(handler));
    }

    /// Emit an event to all handlers
    fn emit_event(&self, event: ExecutionEvent) {
        for handler in &self.event_handlers {
            handler(event.clone());
        }
    }

    /// Run `definition` for `event`: check the trigger, then execute.
    pub async fn run(
        &self,
        definition: &PipelineDefinition,
        event: &TriggerEvent,
        context: &ExecutionContext,
    ) -> RunOutcome {
        if !definition.is_triggered_by(event) {
            info!(
                "Pipeline {} not triggered by branch {:?}",
                definition.name, event.branch
            );
            self.emit_event(ExecutionEvent::PipelineNotTriggered {
                pipeline_name: definition.name.clone(),
                branch: event.branch.clone(),
            });

            let mut state = PipelineState::new();
            state.not_triggered();
            return RunOutcome {
                pipeline_name: definition.name.clone(),
                branch: event.branch.clone(),
                state,
                run_log: RunLog::new(),
                step_states: vec![StepState::Pending; definition.steps().len()],
                failure: None,
                skipped: definition.steps().iter().map(|s| s.id.clone()).collect(),
                artifacts: Vec::new(),
                captured: BTreeMap::new(),
            };
        }

        self.execute(definition, context).await
    }

    /// Execute every step in order, stopping at the first failure
    pub async fn execute(
        &self,
        definition: &PipelineDefinition,
        initial: &ExecutionContext,
    ) -> RunOutcome {
        let mut state = PipelineState::new();
        let execution_id = state.execution_id;
        let steps = definition.steps();

        info!("Starting pipeline execution: {} ({})", definition.name, execution_id);
        state.start(steps.len());
        self.emit_event(ExecutionEvent::PipelineStarted {
            execution_id,
            pipeline_name: definition.name.clone(),
            total_steps: steps.len(),
        });

        let mut context = initial.clone();
        let mut run_log = RunLog::new();
        let mut step_states = vec![StepState::Pending; steps.len()];
        let mut artifacts = Vec::new();
        let mut captured = BTreeMap::new();
        let mut failure = None;

        for (index, step) in steps.iter().enumerate() {
            let executed = self.execute_step(index, step, &context, &mut step_states[index]).await;
            match executed {
                Ok((result, stdout, publish)) => {
                    step_states[index] = result.state.clone();
                    run_log.append(result);
                    state.step_succeeded();

                    if let Some(name) = &step.capture {
                        let value = stdout.trim().to_string();
                        debug!("Step {} captured '{}'", step.id, name);
                        captured.insert(name.clone(), context.redact(&value));
                        context = context.with_output(name, value);
                    }
                    if let Some(publish) = publish {
                        info!("Published {} as {}", publish.file, publish.key);
                        self.emit_event(ExecutionEvent::ArtifactPublished {
                            step_id: step.id.clone(),
                            file: publish.file.clone(),
                            key: publish.key.clone(),
                        });
                        artifacts.push(publish);
                    }
                }
                Err((result, error)) => {
                    step_states[index] = match &result {
                        Some(result) => result.state.clone(),
                        None => step_states[index].fail(error.to_string(), None),
                    };
                    if let Some(result) = result {
                        run_log.append(result);
                    }
                    state.fail(index);
                    failure = Some(StepFailure {
                        index,
                        step_id: step.id.clone(),
                        error,
                    });
                    break;
                }
            }
        }

        let skipped: Vec<String> = match &failure {
            Some(f) => steps[f.index + 1..].iter().map(|s| s.id.clone()).collect(),
            None => Vec::new(),
        };
        for (offset, step_id) in skipped.iter().enumerate() {
            let index = failure.as_ref().map_or(0, |f| f.index + 1) + offset;
            self.emit_event(ExecutionEvent::StepSkipped {
                index,
                step_id: step_id.clone(),
            });
        }

        if failure.is_none() {
            state.complete();
        }
        info!(
            "Pipeline execution finished: {} - {:?}",
            definition.name, state.status
        );
        self.emit_event(ExecutionEvent::PipelineCompleted {
            execution_id,
            status: state.status,
        });

        RunOutcome {
            pipeline_name: definition.name.clone(),
            branch: initial.get_variable("branch").map(str::to_string),
            state,
            run_log,
            step_states,
            failure,
            skipped,
            artifacts,
            captured,
        }
    }

    /// Bind, invoke and classify one step.
    ///
    /// Moves `slot` to `Running` first. On success returns the result, the
    /// raw stdout (for capture) and the published artifact. On failure the
    /// result is absent when no process was started.
    async fn execute_step(
        &self,
        index: usize,
        step: &Step,
        context: &ExecutionContext,
        slot: &mut StepState,
    ) -> Result<(RunResult, String, Option<Publish>), (Option<RunResult>, StepError)> {
        let started_at = Utc::now();
        *slot = StepState::Running { started_at };

        let bound = match self.binder.bind(step, context) {
            Ok(bound) => bound,
            Err(e) => {
                error!("Step {} could not be bound: {}", step.id, e);
                self.emit_failed(index, step, &e, String::new());
                return Err((None, e));
            }
        };

        let command_line = context.redact(&bound.command.display_line());
        info!("Executing step {}: {}", step.id, step.name);
        debug!("Resolved command for step {}: {}", step.id, command_line);
        self.emit_event(ExecutionEvent::StepStarted {
            index,
            step_id: step.id.clone(),
            command: command_line,
        });

        let invoked = self.invoker.invoke(&bound.command).await;
        let finished_at = Utc::now();

        let output = match invoked {
            Ok(output) => output,
            Err(InvokeError::Launch { program, source }) => {
                error!("Step {} failed to launch '{}': {}", step.id, program, source);
                let e = StepError::ProcessLaunch { program, source };
                self.emit_failed(index, step, &e, String::new());
                return Err((None, e));
            }
            Err(InvokeError::Timeout(secs)) => {
                error!("Timeout for step {} after {}s", step.id, secs);
                let result = RunResult {
                    index,
                    step_id: step.id.clone(),
                    step_name: step.name.clone(),
                    state: StepState::TimedOut {
                        timeout_secs: secs,
                        started_at,
                        finished_at,
                    },
                    exit_code: None,
                    stdout: String::new(),
                    stderr: String::new(),
                    started_at,
                    finished_at,
                };
                let e = upload_or(&bound.publish, StepError::ProcessTimeout(secs));
                self.emit_failed(index, step, &e, String::new());
                return Err((Some(result), e));
            }
        };

        let stdout = context.redact(&output.stdout);
        let stderr = context.redact(&output.stderr);
        let mut result = RunResult {
            index,
            step_id: step.id.clone(),
            step_name: step.name.clone(),
            state: StepState::Succeeded {
                exit_code: 0,
                started_at,
                finished_at,
            },
            exit_code: output.exit_code,
            stdout: stdout.clone(),
            stderr: stderr.clone(),
            started_at,
            finished_at,
        };

        if output.success() {
            info!("Step {} completed successfully", step.id);
            self.emit_event(ExecutionEvent::StepSucceeded {
                index,
                step_id: step.id.clone(),
                output: stdout,
            });
            let ProcessOutput { stdout: raw, .. } = output;
            return Ok((result, raw, bound.publish));
        }

        let process_error = match output.exit_code {
            Some(code) => StepError::ProcessFailure { exit_code: code },
            None => StepError::ProcessKilled,
        };
        warn!("Step {} failed: {}", step.id, process_error);
        let e = upload_or(&bound.publish, process_error);
        result.state = StepState::Failed {
            error: e.to_string(),
            exit_code: output.exit_code,
            started_at,
            finished_at,
        };
        let shown = if stderr.trim().is_empty() { stdout } else { stderr };
        self.emit_failed(index, step, &e, shown);
        Err((Some(result), e))
    }

    fn emit_failed(&self, index: usize, step: &Step, error: &StepError, output: String) {
        self.emit_event(ExecutionEvent::StepFailed {
            index,
            step_id: step.id.clone(),
            error: error.to_string(),
            output,
        });
    }
}

/// Failures of a publishing step are upload failures
fn upload_or(publish: &Option<Publish>, error: StepError) -> StepError {
    match publish {
        Some(p) => StepError::UploadFailure {
            file: p.file.clone(),
            key: p.key.clone(),
            reason: error.to_string(),
        },
        None => error,
    }
}
