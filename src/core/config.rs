//! Pipeline configuration from YAML

use crate::core::{template, trigger::BranchPattern, PipelineDefinition};
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use anyhow::{Context, Result};

/// Variable definition - a literal, an environment lookup, or a file reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VariableDefinition {
    /// Simple string value
    String(String),
    /// Read from the runner's process environment when the run starts
    Env { name: String },
    /// File reference with validation flag
    File { path: String, validate_exists: bool },
}

impl VariableDefinition {
    /// Resolve the definition to a value, if one is available
    pub fn resolve(&self) -> Option<String> {
        match self {
            VariableDefinition::String(s) => Some(s.clone()),
            VariableDefinition::Env { name } => std::env::var(name).ok(),
            VariableDefinition::File { path, .. } => Some(path.clone()),
        }
    }
}

/// Top-level pipeline configuration loaded from YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Pipeline name
    pub name: String,

    /// Pipeline version (optional)
    #[serde(default)]
    pub version: Option<String>,

    /// Optional description
    #[serde(default)]
    pub description: Option<String>,

    /// Branch triggers; a pipeline without triggers always runs
    #[serde(default)]
    pub triggers: Option<TriggerConfig>,

    /// Global variables available to all steps
    #[serde(default)]
    variables: HashMap<String, Value>,

    /// Names of environment variables holding secrets
    #[serde(default)]
    pub secrets: Vec<String>,

    /// Pipeline steps, executed in declaration order
    pub steps: Vec<StepConfig>,

    /// Default timeout for steps (in seconds); unbounded when absent
    #[serde(default)]
    pub default_timeout_secs: Option<u64>,
}

/// Trigger section of the pipeline file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TriggerConfig {
    /// Branch glob patterns (`devel`, `release_*`)
    #[serde(default)]
    pub branches: Vec<String>,
}

/// Step configuration as defined in YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepConfig {
    /// Unique step identifier
    pub id: String,

    /// Human-readable step name (defaults to the id)
    #[serde(default)]
    pub name: Option<String>,

    /// Optional step description
    #[serde(default)]
    pub description: Option<String>,

    /// Command and arguments; each argument may contain `{{ name }}` placeholders
    pub run: Vec<String>,

    /// Step-local environment, layered over the run context
    #[serde(default)]
    pub env: BTreeMap<String, String>,

    /// Context keys that must be bound and are exported to the process
    #[serde(default)]
    pub required_env: Vec<String>,

    /// Working directory override
    #[serde(default)]
    pub workdir: Option<String>,

    /// Run the command inside a container
    #[serde(default)]
    pub container: Option<ContainerConfig>,

    /// Store trimmed stdout under this variable name for later steps
    #[serde(default)]
    pub capture: Option<String>,

    /// Artifact published by this step
    #[serde(default)]
    pub publishes: Option<PublishConfig>,

    /// Timeout for this step (overrides global)
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

/// Container wrapping for a step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerConfig {
    /// Image reference, may contain placeholders
    pub image: String,

    /// Container runtime CLI
    #[serde(default = "default_runtime")]
    pub runtime: String,

    /// Volume mounts
    #[serde(default)]
    pub mounts: Vec<MountConfig>,

    /// Working directory inside the container
    #[serde(default)]
    pub workdir: Option<String>,
}

/// A volume mount (`source` on the host, `target` in the container)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MountConfig {
    pub source: String,
    pub target: String,
    #[serde(default)]
    pub read_only: bool,
}

/// Artifact description for publishing steps
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishConfig {
    /// Local file that is uploaded
    pub file: String,

    /// Destination key, usually derived from the branch
    pub key: String,
}

fn default_runtime() -> String {
    "docker".to_string()
}

impl PipelineConfig {
    /// Load pipeline configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::from_yaml(&content)
    }

    /// Parse pipeline configuration from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: PipelineConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the pipeline configuration
    pub fn validate(&self) -> Result<()> {
        let mut seen_ids = HashSet::new();
        for step in &self.steps {
            if !seen_ids.insert(&step.id) {
                anyhow::bail!("Duplicate step ID: {}", step.id);
            }
            if step.run.is_empty() || step.run[0].trim().is_empty() {
                anyhow::bail!("Step '{}' has an empty command", step.id);
            }
            if let Some(capture) = &step.capture {
                if !template::is_valid_name(capture) {
                    anyhow::bail!(
                        "Step '{}' captures into invalid variable name '{}'",
                        step.id,
                        capture
                    );
                }
                if self.secrets.contains(capture) {
                    anyhow::bail!(
                        "Step '{}' capture '{}' collides with a secret",
                        step.id,
                        capture
                    );
                }
            }
            for key in step.env.keys().chain(step.required_env.iter()) {
                if !template::is_valid_name(key) {
                    anyhow::bail!("Step '{}' has invalid environment key '{}'", step.id, key);
                }
            }
        }

        if let Some(triggers) = &self.triggers {
            for pattern in &triggers.branches {
                BranchPattern::parse(pattern)
                    .with_context(|| format!("Invalid trigger pattern '{}'", pattern))?;
            }
        }

        for (var_name, var_def) in self.get_variables() {
            if let VariableDefinition::File { path, validate_exists: true } = &var_def {
                if !Path::new(path).exists() {
                    anyhow::bail!(
                        "Variable '{}' references file that doesn't exist: {}",
                        var_name,
                        path
                    );
                }
            }
        }

        Ok(())
    }

    /// Get variables as parsed VariableDefinition enum
    pub fn get_variables(&self) -> HashMap<String, VariableDefinition> {
        let mut vars = HashMap::new();

        for (key, value) in &self.variables {
            let var_def = match value {
                Value::String(s) => VariableDefinition::String(s.clone()),
                Value::Mapping(map) => {
                    if let Some(name) = map
                        .get("env")
                        .and_then(|v| v.as_str())
                    {
                        VariableDefinition::Env { name: name.to_string() }
                    } else {
                        let path = map
                            .get("path")
                            .and_then(|v| v.as_str())
                            .unwrap_or("")
                            .to_string();

                        let validate_exists = map
                            .get("validate_exists")
                            .and_then(|v| v.as_bool())
                            .unwrap_or(false);

                        VariableDefinition::File { path, validate_exists }
                    }
                }
                // Numbers and booleans: render the scalar without YAML framing
                _ => VariableDefinition::String(
                    serde_yaml::to_string(value)
                        .unwrap_or_default()
                        .trim()
                        .to_string(),
                ),
            };
            vars.insert(key.clone(), var_def);
        }

        vars
    }

    /// Number of declared variables
    pub fn variable_count(&self) -> usize {
        self.variables.len()
    }

    /// Convert config to a pipeline definition
    pub fn to_definition(&self) -> PipelineDefinition {
        PipelineDefinition::from_config(self)
    }
}
