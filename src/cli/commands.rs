//! CLI command definitions

use clap::Args;

/// Run a pipeline
#[derive(Debug, Args, Clone)]
pub struct RunCommand {
    /// Path to pipeline YAML file
    #[arg(short, long)]
    pub file: String,

    /// Branch that triggered the run; omit for a manual run
    #[arg(short, long, env = "BRANCHLINE_BRANCH")]
    pub branch: Option<String>,

    /// Variable overrides (key=value)
    #[arg(long, value_parser = parse_key_value)]
    pub var: Vec<(String, String)>,

    /// Resolve and print every command without running anything
    #[arg(long)]
    pub dry_run: bool,

    /// Don't save execution to history
    #[arg(long)]
    pub no_history: bool,
}

/// Validate a pipeline configuration
#[derive(Debug, Args, Clone)]
pub struct ValidateCommand {
    /// Path to pipeline YAML file
    #[arg(short, long)]
    pub file: String,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Check a branch against a pipeline's triggers
#[derive(Debug, Args, Clone)]
pub struct MatchesCommand {
    /// Path to pipeline YAML file
    #[arg(short, long)]
    pub file: String,

    /// Branch name to test
    #[arg(short, long)]
    pub branch: String,
}

/// List pipelines with recorded runs
#[derive(Debug, Args, Clone)]
pub struct ListCommand {
    /// Show execution counts
    #[arg(long)]
    pub with_counts: bool,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Show execution history
#[derive(Debug, Args, Clone)]
pub struct HistoryCommand {
    /// Pipeline name to filter by
    #[arg(short, long)]
    pub pipeline: Option<String>,

    /// Number of recent executions to show
    #[arg(short, long, default_value_t = 10)]
    pub limit: usize,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,

    /// Show a single execution in detail
    #[arg(long)]
    pub execution_id: Option<String>,
}

/// Parse key=value pairs
pub fn parse_key_value(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, _)) if key.is_empty() => Err(format!("Missing key in '{}'", s)),
        Some((key, value)) => Ok((key.to_string(), value.to_string())),
        None => Err(format!("Invalid key=value pair: {}", s)),
    }
}
