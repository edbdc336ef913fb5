//! Pipeline definition domain model

use crate::core::{
    config::{PipelineConfig, VariableDefinition},
    context::ExecutionContext,
    step::Step,
    trigger::{TriggerEvent, TriggerMatcher},
};
use std::collections::{BTreeMap, BTreeSet};

/// A loaded pipeline: triggers plus an ordered list of steps.
///
/// Immutable once built; runs never modify it.
#[derive(Debug, Clone)]
pub struct PipelineDefinition {
    /// Pipeline name
    pub name: String,

    /// Branch triggers; `None` means the pipeline always runs
    pub triggers: Option<TriggerMatcher>,

    /// Declared variables, resolved when a run's context is built
    pub variables: BTreeMap<String, VariableDefinition>,

    /// Environment variable names read as secrets at run start
    pub secrets: Vec<String>,

    /// Steps in execution order
    steps: Vec<Step>,
}

impl PipelineDefinition {
    /// Create a definition from configuration
    pub fn from_config(config: &PipelineConfig) -> Self {
        let steps = config
            .steps
            .iter()
            .map(|step_config| Step::from_config(step_config, config.default_timeout_secs))
            .collect();

        let variables = config.get_variables().into_iter().collect();

        PipelineDefinition {
            name: config.name.clone(),
            triggers: config
                .triggers
                .as_ref()
                .map(|t| TriggerMatcher::new(t.branches.iter().cloned())),
            variables,
            secrets: config.secrets.clone(),
            steps,
        }
    }

    /// A definition built in code
    pub fn new(name: impl Into<String>, steps: Vec<Step>) -> Self {
        Self {
            name: name.into(),
            triggers: None,
            variables: BTreeMap::new(),
            secrets: Vec::new(),
            steps,
        }
    }

    /// Restrict the definition to branches matching `patterns`
    pub fn with_triggers<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.triggers = Some(TriggerMatcher::new(patterns));
        self
    }

    /// Steps in declaration order
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Get a step by ID
    pub fn step(&self, id: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.id == id)
    }

    /// Whether `event` should start a run
    pub fn is_triggered_by(&self, event: &TriggerEvent) -> bool {
        match &self.triggers {
            Some(matcher) => matcher.matches_event(event),
            None => true,
        }
    }

    /// Names steps reference that neither the definition nor the event
    /// provides. Binding fails unless overrides supply them.
    ///
    /// Captures count as provided for the steps after the capturing one.
    pub fn unresolved_names(&self) -> Vec<&str> {
        let mut known: BTreeSet<&str> = self
            .variables
            .keys()
            .chain(self.secrets.iter())
            .map(String::as_str)
            .chain(["branch", "branch_slug"])
            .collect();
        let mut unresolved = Vec::new();

        for step in &self.steps {
            for name in step.referenced_names() {
                if !known.contains(name) && !step.env.contains_key(name) && !unresolved.contains(&name) {
                    unresolved.push(name);
                }
            }
            if let Some(capture) = &step.capture {
                known.insert(capture.as_str());
            }
        }

        unresolved
    }

    /// Build the initial context for a run.
    ///
    /// Layering, lowest first: declared variables, event metadata, secrets
    /// read from the environment, then `overrides`.
    pub fn initial_context(
        &self,
        event: &TriggerEvent,
        overrides: &[(String, String)],
    ) -> ExecutionContext {
        let mut context = ExecutionContext::new();
        for (key, definition) in &self.variables {
            if let Some(value) = definition.resolve() {
                context.set_variable(key.clone(), value);
            }
        }

        let mut context = context.with_event(event);

        for name in &self.secrets {
            if let Ok(value) = std::env::var(name) {
                context.set_secret(name.clone(), value);
            }
        }

        for (key, value) in overrides {
            context.set_variable(key.clone(), value.clone());
        }

        context
    }
}
