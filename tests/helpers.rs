//! Test utility functions for branchline

#![allow(dead_code)]

use async_trait::async_trait;
use branchline::core::config::PipelineConfig;
use branchline::core::{ExecutionStatus, PipelineDefinition};
use branchline::execution::{
    InvokeError, ProcessInvoker, ProcessOutput, ResolvedCommand, RunOutcome, StepError,
};
use std::sync::Mutex;

/// Scripted reply for commands matching a pattern
#[derive(Debug, Clone)]
enum Reply {
    Output(ProcessOutput),
    LaunchFails,
    TimesOut(u64),
}

/// Mock invoker that records every resolved command and answers from a script.
///
/// Rules match on a substring of the command's display line; the first
/// matching rule wins. Unmatched commands exit 0 with no output.
#[derive(Default)]
pub struct MockInvoker {
    rules: Vec<(String, Reply)>,
    calls: Mutex<Vec<ResolvedCommand>>,
}

impl MockInvoker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Commands containing `pattern` exit with `exit_code` and print `stdout`
    pub fn on(mut self, pattern: &str, exit_code: i32, stdout: &str) -> Self {
        self.rules.push((
            pattern.to_string(),
            Reply::Output(ProcessOutput::new(exit_code, stdout, "")),
        ));
        self
    }

    /// Commands containing `pattern` exit non-zero with `stderr`
    pub fn fails(mut self, pattern: &str, exit_code: i32, stderr: &str) -> Self {
        self.rules.push((
            pattern.to_string(),
            Reply::Output(ProcessOutput::new(exit_code, "", stderr)),
        ));
        self
    }

    /// Commands containing `pattern` cannot be launched
    pub fn launch_fails(mut self, pattern: &str) -> Self {
        self.rules.push((pattern.to_string(), Reply::LaunchFails));
        self
    }

    /// Commands containing `pattern` run past their deadline
    pub fn times_out(mut self, pattern: &str, secs: u64) -> Self {
        self.rules.push((pattern.to_string(), Reply::TimesOut(secs)));
        self
    }

    /// Every command invoked so far, in order
    pub fn calls(&self) -> Vec<ResolvedCommand> {
        self.calls.lock().unwrap().clone()
    }

    /// Display lines of every command invoked so far
    pub fn call_lines(&self) -> Vec<String> {
        self.calls().iter().map(|c| c.display_line()).collect()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl ProcessInvoker for MockInvoker {
    async fn invoke(&self, command: &ResolvedCommand) -> Result<ProcessOutput, InvokeError> {
        self.calls.lock().unwrap().push(command.clone());

        let line = command.display_line();
        let reply = self
            .rules
            .iter()
            .find(|(pattern, _)| line.contains(pattern.as_str()))
            .map(|(_, reply)| reply.clone());

        match reply {
            Some(Reply::Output(output)) => Ok(output),
            Some(Reply::LaunchFails) => Err(InvokeError::Launch {
                program: command.program.clone(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "No such file or directory"),
            }),
            Some(Reply::TimesOut(secs)) => Err(InvokeError::Timeout(secs)),
            None => Ok(ProcessOutput::new(0, "", "")),
        }
    }
}

/// Build a pipeline definition from YAML
pub fn definition(yaml: &str) -> PipelineDefinition {
    PipelineConfig::from_yaml(yaml)
        .expect("test pipeline should be valid")
        .to_definition()
}

/// The schema-publish demo pipeline shipped with the crate
pub fn schema_publish() -> PipelineDefinition {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/demos/schema-publish.yaml");
    PipelineConfig::from_file(path)
        .expect("demo pipeline should be valid")
        .to_definition()
}

/// Four-step build, login, generate and upload pipeline.
///
/// Declares no secrets, so tests bind them explicitly instead of reading the
/// runner's environment.
pub const FOUR_STEP_PIPELINE: &str = r#"
name: "schema-publish"
triggers:
  branches: ["devel", "release_*", "feature_*"]
variables:
  registry: "registry.example.org/platform"
  version: "1.4.0"
steps:
  - id: "build-image"
    run: ["docker", "build", "-t", "{{ registry }}/dev:{{ version }}", "."]
  - id: "registry-login"
    run: ["docker", "login", "--username", "ci", "{{ registry }}"]
    required_env: ["REGISTRY_TOKEN"]
  - id: "generate-schema"
    container:
      image: "{{ registry }}/dev:{{ version }}"
      mounts:
        - source: "/work"
          target: "/src"
      workdir: "/src"
    run: ["sbt", "test:runMain GenerateSchema"]
  - id: "upload"
    run: ["aws", "s3", "cp", "schema.json", "s3://schemas/{{ branch }}/schema.json", "--acl", "public-read"]
    required_env: ["AWS_ACCESS_KEY", "AWS_SECRET_KEY", "AWS_DEFAULT_REGION"]
    publishes:
      file: "schema.json"
      key: "{{ branch }}/schema.json"
"#;

/// Assert the run executed exactly `expected` steps, in order
pub fn assert_executed(outcome: &RunOutcome, expected: &[&str]) {
    assert_eq!(
        outcome.run_log.executed_steps(),
        expected,
        "unexpected executed steps"
    );
}

/// Assert the run completed successfully
pub fn assert_success(outcome: &RunOutcome) {
    assert_eq!(
        outcome.status(),
        ExecutionStatus::Completed,
        "run failed: {:?}",
        outcome.failure
    );
    assert!(outcome.failure.is_none());
}

/// Assert the run failed at `index` with an error of `kind`
pub fn assert_failed_at<'a>(outcome: &'a RunOutcome, index: usize, kind: &str) -> &'a StepError {
    assert_eq!(outcome.status(), ExecutionStatus::Failed);
    let failure = outcome.failure.as_ref().expect("failed run should record its failure");
    assert_eq!(failure.index, index, "failed at step {}", failure.step_id);
    assert_eq!(failure.error.kind(), kind, "unexpected error: {}", failure.error);
    &failure.error
}
