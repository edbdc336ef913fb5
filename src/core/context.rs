//! Execution context - the resolved variables a step runs with

use crate::core::trigger::TriggerEvent;
use secrecy::{ExposeSecret, SecretString};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

const REDACTED: &str = "[REDACTED]";

/// Variables available to a pipeline run
///
/// Built fresh per run and never persisted. Steps receive it by reference;
/// captured outputs produce a new context via [`ExecutionContext::with_output`]
/// rather than mutating the one a step already saw.
#[derive(Clone, Default)]
pub struct ExecutionContext {
    /// Plain variables: declared values, event metadata, captured outputs
    variables: BTreeMap<String, String>,

    /// Secret values, exposed only when building a process environment
    secrets: BTreeMap<String, SecretString>,

    /// Every name ever bound as a secret, kept even when a variable later
    /// replaces the value. Processes only see these when a step binds them.
    secret_names: BTreeSet<String>,
}

impl ExecutionContext {
    /// Create a new empty context
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style variable insertion
    pub fn with_variable(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_variable(key, value);
        self
    }

    /// Builder-style secret insertion
    pub fn with_secret(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_secret(key, value);
        self
    }

    /// Set a variable, replacing any secret of the same name
    pub fn set_variable(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        self.secrets.remove(&key);
        self.variables.insert(key, value.into());
    }

    /// Set a secret
    pub fn set_secret(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        self.variables.remove(&key);
        self.secret_names.insert(key.clone());
        self.secrets.insert(key, SecretString::from(value.into()));
    }

    /// Add the event metadata (`branch`, `branch_slug`)
    pub fn with_event(mut self, event: &TriggerEvent) -> Self {
        if let Some(branch) = &event.branch {
            self.set_variable("branch", branch.clone());
            self.set_variable("branch_slug", branch.replace('/', "-"));
        }
        self
    }

    /// Get a plain variable
    pub fn get_variable(&self, key: &str) -> Option<&str> {
        self.variables.get(key).map(String::as_str)
    }

    /// Look a key up among variables and secrets.
    ///
    /// The returned value may be a secret; callers must not log it.
    pub fn lookup(&self, key: &str) -> Option<&str> {
        self.secrets
            .get(key)
            .map(|s| s.expose_secret())
            .or_else(|| self.get_variable(key))
    }

    /// Whether `key` is bound at all
    pub fn contains(&self, key: &str) -> bool {
        self.secrets.contains_key(key) || self.variables.contains_key(key)
    }

    /// Whether `key` holds a secret
    pub fn is_secret(&self, key: &str) -> bool {
        self.secrets.contains_key(key)
    }

    /// Names that were bound as secrets at any point
    pub fn secret_names(&self) -> impl Iterator<Item = &str> {
        self.secret_names.iter().map(String::as_str)
    }

    /// A new context with a step's captured output bound under `key`
    pub fn with_output(&self, key: &str, value: impl Into<String>) -> Self {
        let mut next = self.clone();
        next.set_variable(key, value);
        next
    }

    /// Plain variables, for display and persistence
    pub fn variables(&self) -> &BTreeMap<String, String> {
        &self.variables
    }

    /// Replace every non-empty secret value occurring in `text`
    pub fn redact(&self, text: &str) -> String {
        let mut redacted = text.to_string();
        for secret in self.secrets.values() {
            let value = secret.expose_secret();
            if !value.is_empty() {
                redacted = redacted.replace(value, REDACTED);
            }
        }
        redacted
    }
}

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("variables", &self.variables)
            .field("secrets", &self.secrets.keys().collect::<Vec<_>>())
            .finish()
    }
}
