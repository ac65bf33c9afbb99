//! CLI-specific functionality for the relay
//!
//! This module contains all CLI-related code including argument parsing,
//! configuration discovery and the `run` flow.

pub mod args;
pub mod config;
pub mod run;

pub use args::{Args, Commands, RunArgs};
pub use config::{ConfigDiscovery, apply_overrides};
pub use run::{RunRequest, execute_run};
