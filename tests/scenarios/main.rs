//! Scenario-based tests for branchline

#[path = "../helpers.rs"]
mod helpers;

mod binding;
mod end_to_end;
mod failures;
mod sequencing;
mod triggers;
