//! Step error taxonomy

use thiserror::Error;

/// Why a step halted the run
#[derive(Debug, Error)]
pub enum StepError {
    /// A required or referenced key has no bound value
    #[error("missing variable '{key}'")]
    MissingVariable { key: String },

    /// The process could not be started
    #[error("failed to launch '{program}': {source}")]
    ProcessLaunch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The process exited non-zero
    #[error("process exited with code {exit_code}")]
    ProcessFailure { exit_code: i32 },

    /// The process was killed by a signal
    #[error("process terminated by signal")]
    ProcessKilled,

    /// The configured deadline elapsed
    #[error("timed out after {0} seconds")]
    ProcessTimeout(u64),

    /// The publish step failed
    #[error("upload of '{file}' to '{key}' failed: {reason}")]
    UploadFailure {
        file: String,
        key: String,
        reason: String,
    },
}

impl StepError {
    /// Short machine-readable kind, used for persistence and events
    pub fn kind(&self) -> &'static str {
        match self {
            StepError::MissingVariable { .. } => "MissingVariable",
            StepError::ProcessLaunch { .. } => "ProcessLaunchError",
            StepError::ProcessFailure { .. } => "ProcessFailure",
            StepError::ProcessKilled => "ProcessFailure",
            StepError::ProcessTimeout(_) => "ProcessTimeout",
            StepError::UploadFailure { .. } => "UploadFailure",
        }
    }

    /// Whether the process was started before the error occurred
    pub fn process_started(&self) -> bool {
        !matches!(
            self,
            StepError::MissingVariable { .. } | StepError::ProcessLaunch { .. }
        )
    }
}
