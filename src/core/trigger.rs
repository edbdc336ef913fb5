//! Branch trigger matching

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

/// Why a trigger pattern was rejected
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TriggerError {
    #[error("pattern is empty")]
    Empty,

    #[error("wildcard is only allowed as the last character: {0}")]
    MisplacedWildcard(String),
}

/// A parsed branch pattern
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BranchPattern {
    /// Matches exactly this branch
    Exact(String),
    /// Matches any branch starting with this prefix (`release_*`)
    Prefix(String),
}

impl BranchPattern {
    /// Parse a pattern. Only a single trailing `*` is accepted.
    pub fn parse(pattern: &str) -> Result<Self, TriggerError> {
        if pattern.is_empty() {
            return Err(TriggerError::Empty);
        }

        match pattern.find('*') {
            None => Ok(BranchPattern::Exact(pattern.to_string())),
            Some(pos) if pos == pattern.len() - 1 => {
                Ok(BranchPattern::Prefix(pattern[..pos].to_string()))
            }
            Some(_) => Err(TriggerError::MisplacedWildcard(pattern.to_string())),
        }
    }

    /// Case-sensitive match against a branch name
    pub fn matches(&self, branch: &str) -> bool {
        match self {
            BranchPattern::Exact(name) => name == branch,
            BranchPattern::Prefix(prefix) => branch.starts_with(prefix.as_str()),
        }
    }
}

/// The version-control event that starts a run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerEvent {
    /// Pushed branch, if the run was started by a push
    pub branch: Option<String>,
}

impl TriggerEvent {
    /// A push to `branch`
    pub fn push(branch: impl Into<String>) -> Self {
        Self {
            branch: Some(branch.into()),
        }
    }

    /// A run started without a branch (manual invocation)
    pub fn manual() -> Self {
        Self::default()
    }
}

/// Decides whether an event satisfies a set of branch patterns
#[derive(Debug, Clone)]
pub struct TriggerMatcher {
    patterns: Vec<(String, Result<BranchPattern, TriggerError>)>,
}

impl TriggerMatcher {
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let patterns = patterns
            .into_iter()
            .map(|p| {
                let raw = p.into();
                let parsed = BranchPattern::parse(&raw);
                (raw, parsed)
            })
            .collect();
        Self { patterns }
    }

    /// Raw patterns as declared
    pub fn patterns(&self) -> impl Iterator<Item = &str> {
        self.patterns.iter().map(|(raw, _)| raw.as_str())
    }

    /// Whether `branch` matches any pattern.
    ///
    /// Malformed patterns never match.
    pub fn matches(&self, branch: &str) -> bool {
        self.patterns.iter().any(|(raw, parsed)| match parsed {
            Ok(pattern) => pattern.matches(branch),
            Err(e) => {
                warn!("Ignoring malformed trigger pattern '{}': {}", raw, e);
                false
            }
        })
    }

    /// Whether the event should start a run. Events without a branch never match.
    pub fn matches_event(&self, event: &TriggerEvent) -> bool {
        event.branch.as_deref().is_some_and(|b| self.matches(b))
    }
}
