//! Step domain model

use crate::core::config::{ContainerConfig, MountConfig, PublishConfig, StepConfig};
use crate::core::template;
use std::collections::BTreeMap;

/// A single step in a pipeline
#[derive(Debug, Clone)]
pub struct Step {
    /// Unique step identifier
    pub id: String,

    /// Human-readable name
    pub name: String,

    /// Command template, one entry per argument
    pub command: Vec<String>,

    /// Step-local environment overrides (values are templates)
    pub env: BTreeMap<String, String>,

    /// Context keys that must be bound for this step
    pub required_env: Vec<String>,

    /// Working directory override (template)
    pub workdir: Option<String>,

    /// Container wrapping
    pub container: Option<Container>,

    /// Variable that receives this step's trimmed stdout
    pub capture: Option<String>,

    /// Artifact published by this step
    pub publishes: Option<Publish>,

    /// Deadline in seconds; `None` is unbounded
    pub timeout_secs: Option<u64>,
}

/// Container the step's command runs in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Container {
    pub runtime: String,
    pub image: String,
    pub mounts: Vec<Mount>,
    pub workdir: Option<String>,
}

/// Host directory mounted into a container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mount {
    pub source: String,
    pub target: String,
    pub read_only: bool,
}

/// Artifact upload performed by a step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Publish {
    pub file: String,
    pub key: String,
}

impl From<&MountConfig> for Mount {
    fn from(config: &MountConfig) -> Self {
        Self {
            source: config.source.clone(),
            target: config.target.clone(),
            read_only: config.read_only,
        }
    }
}

impl From<&ContainerConfig> for Container {
    fn from(config: &ContainerConfig) -> Self {
        Self {
            runtime: config.runtime.clone(),
            image: config.image.clone(),
            mounts: config.mounts.iter().map(Mount::from).collect(),
            workdir: config.workdir.clone(),
        }
    }
}

impl From<&PublishConfig> for Publish {
    fn from(config: &PublishConfig) -> Self {
        Self {
            file: config.file.clone(),
            key: config.key.clone(),
        }
    }
}

impl Step {
    /// Create a step from a step config
    pub fn from_config(config: &StepConfig, default_timeout_secs: Option<u64>) -> Self {
        Step {
            id: config.id.clone(),
            name: config.name.clone().unwrap_or_else(|| config.id.clone()),
            command: config.run.clone(),
            env: config.env.clone(),
            required_env: config.required_env.clone(),
            workdir: config.workdir.clone(),
            container: config.container.as_ref().map(Container::from),
            capture: config.capture.clone(),
            publishes: config.publishes.as_ref().map(Publish::from),
            timeout_secs: config.timeout_secs.or(default_timeout_secs),
        }
    }

    /// A bare step running `command`, used by tests and programmatic pipelines
    pub fn new<S: Into<String>>(id: impl Into<String>, command: impl IntoIterator<Item = S>) -> Self {
        let id = id.into();
        Step {
            name: id.clone(),
            id,
            command: command.into_iter().map(Into::into).collect(),
            env: BTreeMap::new(),
            required_env: Vec::new(),
            workdir: None,
            container: None,
            capture: None,
            publishes: None,
            timeout_secs: None,
        }
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn with_required_env(mut self, key: impl Into<String>) -> Self {
        self.required_env.push(key.into());
        self
    }

    pub fn with_capture(mut self, name: impl Into<String>) -> Self {
        self.capture = Some(name.into());
        self
    }

    pub fn with_publish(mut self, file: impl Into<String>, key: impl Into<String>) -> Self {
        self.publishes = Some(Publish {
            file: file.into(),
            key: key.into(),
        });
        self
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    /// Every context name this step references, required keys first
    pub fn referenced_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.required_env.iter().map(String::as_str).collect();
        let templates = self
            .command
            .iter()
            .chain(self.env.values())
            .chain(self.workdir.iter())
            .chain(self.container.iter().flat_map(|c| {
                std::iter::once(&c.image)
                    .chain(c.workdir.iter())
                    .chain(c.mounts.iter().flat_map(|m| [&m.source, &m.target]))
            }))
            .chain(self.publishes.iter().flat_map(|p| [&p.file, &p.key]));

        for t in templates {
            for name in template::placeholders(t) {
                if !names.contains(&name) {
                    names.push(name);
                }
            }
        }
        names
    }
}
