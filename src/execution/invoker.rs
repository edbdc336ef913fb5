//! External process invoker - runs a resolved command as a subprocess

use crate::execution::binder::ResolvedCommand;
use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Errors raised before a process produced an exit status
#[derive(Debug, Error)]
pub enum InvokeError {
    #[error("failed to launch '{program}': {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("timed out after {0} seconds")]
    Timeout(u64),
}

/// Exit status and captured output of a finished process
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProcessOutput {
    /// Exit code; `None` when the process was killed by a signal
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    pub fn new(exit_code: i32, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            exit_code: Some(exit_code),
            stdout: stdout.into(),
            stderr: stderr.into(),
        }
    }

    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Trait for process invocation - allows for different implementations
#[async_trait]
pub trait ProcessInvoker: Send + Sync {
    /// Run `command` to completion
    async fn invoke(&self, command: &ResolvedCommand) -> Result<ProcessOutput, InvokeError>;
}

/// Invoker that spawns real subprocesses
#[derive(Debug, Clone, Default)]
pub struct SubprocessInvoker;

impl SubprocessInvoker {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ProcessInvoker for SubprocessInvoker {
    /// Spawn the command, inherit the runner's environment minus withheld
    /// secrets, overlay the bound one, then wait for it.
    ///
    /// A timed-out child is killed when its future is dropped.
    async fn invoke(&self, command: &ResolvedCommand) -> Result<ProcessOutput, InvokeError> {
        debug!(
            "Spawning '{}' with {} args and {} bound env keys",
            command.program,
            command.args.len(),
            command.env.len()
        );

        let mut cmd = Command::new(&command.program);
        for name in &command.withheld_env {
            cmd.env_remove(name);
        }
        cmd.args(&command.args)
            .envs(&command.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &command.workdir {
            cmd.current_dir(dir);
        }

        let output = match command.timeout_secs {
            Some(secs) => timeout(Duration::from_secs(secs), cmd.output())
                .await
                .map_err(|_| InvokeError::Timeout(secs))?,
            None => cmd.output().await,
        };

        let output = output.map_err(|e| InvokeError::Launch {
            program: command.program.clone(),
            source: e,
        })?;

        let result = ProcessOutput {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };

        if !result.success() {
            warn!(
                "'{}' exited with code {:?}",
                command.program, result.exit_code
            );
        }
        debug!("'{}' returned {} bytes of stdout", command.program, result.stdout.len());

        Ok(result)
    }
}
