//! Environment binder - materializes a step against an execution context

use crate::core::{ExecutionContext, PipelineDefinition, Publish, Step};
use crate::core::template;
use crate::execution::error::StepError;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;

/// A fully-resolved command, ready for the invoker
#[derive(Clone, PartialEq, Eq)]
pub struct ResolvedCommand {
    pub program: String,
    pub args: Vec<String>,
    /// Bound environment, overlaid on the runner's own
    pub env: BTreeMap<String, String>,
    /// Secret names the step did not bind; removed from the inherited
    /// environment so only requested secrets reach the process
    pub withheld_env: BTreeSet<String>,
    pub workdir: Option<PathBuf>,
    pub timeout_secs: Option<u64>,
}

impl ResolvedCommand {
    /// Shell-like rendering of program and arguments, for logs
    pub fn display_line(&self) -> String {
        std::iter::once(&self.program)
            .chain(self.args.iter())
            .map(|arg| {
                if arg.is_empty() || arg.contains(char::is_whitespace) {
                    format!("'{}'", arg)
                } else {
                    arg.clone()
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl fmt::Debug for ResolvedCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedCommand")
            .field("program", &self.program)
            .field("args", &self.args)
            .field("env", &self.env.keys().collect::<Vec<_>>())
            .field("withheld_env", &self.withheld_env)
            .field("workdir", &self.workdir)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

/// A step with every template resolved
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundStep {
    pub command: ResolvedCommand,
    /// Artifact with file and key resolved
    pub publish: Option<Publish>,
}

/// One step of a dry run
#[derive(Debug)]
pub struct PlannedStep {
    pub index: usize,
    pub step_id: String,
    pub bound: Result<BoundStep, StepError>,
}

/// Resolves a step's environment and templates from an execution context
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvironmentBinder;

impl EnvironmentBinder {
    pub fn new() -> Self {
        Self
    }

    /// Build the process environment for `step`.
    ///
    /// Step-local `env` entries take precedence over the context; every
    /// `required_env` key must be bound by one or the other.
    pub fn bind_env(
        &self,
        step: &Step,
        context: &ExecutionContext,
    ) -> Result<BTreeMap<String, String>, StepError> {
        let mut env = BTreeMap::new();

        for (key, value) in &step.env {
            let rendered = render(value, |k| context.lookup(k))?;
            env.insert(key.clone(), rendered);
        }

        for key in &step.required_env {
            if env.contains_key(key) {
                continue;
            }
            let value = context
                .lookup(key)
                .ok_or_else(|| StepError::MissingVariable { key: key.clone() })?;
            env.insert(key.clone(), value.to_string());
        }

        Ok(env)
    }

    /// Resolve every template in `step` into a runnable command
    pub fn bind(&self, step: &Step, context: &ExecutionContext) -> Result<BoundStep, StepError> {
        let env = self.bind_env(step, context)?;
        let lookup = |k: &str| env.get(k).map(String::as_str).or_else(|| context.lookup(k));

        let args = step
            .command
            .iter()
            .map(|arg| render(arg, lookup))
            .collect::<Result<Vec<_>, _>>()?;

        let workdir = step
            .workdir
            .as_deref()
            .map(|w| render(w, lookup).map(PathBuf::from))
            .transpose()?;

        let publish = step
            .publishes
            .as_ref()
            .map(|p| -> Result<Publish, StepError> {
                Ok(Publish {
                    file: render(&p.file, lookup)?,
                    key: render(&p.key, lookup)?,
                })
            })
            .transpose()?;

        let (program, args) = match &step.container {
            None => {
                let mut args = args.into_iter();
                let program = args.next().unwrap_or_default();
                (program, args.collect())
            }
            Some(container) => {
                let mut wrapped = vec!["run".to_string(), "--rm".to_string()];
                for mount in &container.mounts {
                    let mut volume = format!(
                        "{}:{}",
                        render(&mount.source, lookup)?,
                        render(&mount.target, lookup)?
                    );
                    if mount.read_only {
                        volume.push_str(":ro");
                    }
                    wrapped.push("-v".to_string());
                    wrapped.push(volume);
                }
                if let Some(dir) = &container.workdir {
                    wrapped.push("-w".to_string());
                    wrapped.push(render(dir, lookup)?);
                }
                // Values reach the container through the runtime's own
                // environment; only names go on the command line.
                for key in env.keys() {
                    wrapped.push("-e".to_string());
                    wrapped.push(key.clone());
                }
                wrapped.push(render(&container.image, lookup)?);
                wrapped.extend(args);
                (container.runtime.clone(), wrapped)
            }
        };

        let withheld_env = context
            .secret_names()
            .filter(|name| !env.contains_key(*name))
            .map(str::to_string)
            .collect();

        Ok(BoundStep {
            command: ResolvedCommand {
                program,
                args,
                env,
                withheld_env,
                workdir,
                timeout_secs: step.timeout_secs,
            },
            publish,
        })
    }

    /// Bind every step without running anything.
    ///
    /// Captured outputs are not known ahead of time, so each capture is
    /// bound to a `<name>` placeholder for the steps after it.
    pub fn plan(&self, definition: &PipelineDefinition, context: &ExecutionContext) -> Vec<PlannedStep> {
        let mut context = context.clone();
        let mut planned = Vec::with_capacity(definition.steps().len());

        for (index, step) in definition.steps().iter().enumerate() {
            planned.push(PlannedStep {
                index,
                step_id: step.id.clone(),
                bound: self.bind(step, &context),
            });
            if let Some(name) = &step.capture {
                context = context.with_output(name, format!("<{}>", name));
            }
        }

        planned
    }
}

fn render<'a, F>(template: &str, lookup: F) -> Result<String, StepError>
where
    F: Fn(&str) -> Option<&'a str>,
{
    template::render(template, lookup).map_err(|key| StepError::MissingVariable { key })
}
