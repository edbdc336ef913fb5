//! Core domain models for pipelines
//!
//! This module defines the pipeline definition, its steps, the execution
//! context they run with and the trigger that gates a run.

pub mod config;
pub mod context;
pub mod pipeline;
pub mod state;
pub mod step;
pub mod template;
pub mod trigger;

pub use context::*;
pub use pipeline::*;
pub use state::*;
pub use step::*;
pub use trigger::{BranchPattern, TriggerEvent, TriggerMatcher};
