//! Configuration discovery and loading
//!
//! This module handles the configuration discovery hierarchy:
//! 1. Explicit path given with `--config`
//! 2. Current directory: ./relay.toml
//! 3. User config: ~/.relay/config.toml
//! 4. Built-in defaults

use super::Args;
use crate::env;
use crate::relay::{BackendOptions, DockerOptions, RelayOptions};
use anyhow::{Context, Result};
use std::env as std_env;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Configuration discovery system
pub struct ConfigDiscovery;

impl ConfigDiscovery {
    /// Load the explicit config if given, otherwise the first discovered one.
    pub fn load(explicit: Option<&Path>) -> Result<RelayOptions> {
        if let Some(path) = explicit {
            info!("Loading configuration from: {:?}", path);
            return RelayOptions::from_toml_file(path)
                .with_context(|| format!("Failed to load configuration {:?}", path));
        }

        if let Some(path) = Self::find_config_file() {
            info!("Loading configuration from: {:?}", path);
            return RelayOptions::from_toml_file(&path)
                .with_context(|| format!("Failed to load configuration {:?}", path));
        }

        info!("No configuration file found, using defaults");
        Ok(RelayOptions::default())
    }

    /// Find configuration file using discovery hierarchy
    pub fn find_config_file() -> Option<PathBuf> {
        Self::first_existing(Self::config_candidates())
    }

    fn first_existing(candidates: Vec<PathBuf>) -> Option<PathBuf> {
        for candidate in candidates {
            debug!("Checking for config file: {:?}", candidate);
            if candidate.is_file() {
                debug!("Found config file: {:?}", candidate);
                return Some(candidate);
            }
        }

        debug!("No config file found in discovery hierarchy");
        None
    }

    /// Get list of configuration file candidates in priority order
    fn config_candidates() -> Vec<PathBuf> {
        let mut candidates = Vec::new();

        if let Ok(current_dir) = std_env::current_dir() {
            candidates.push(env::local_config_path(&current_dir));
        }

        if let Some(home_dir) = Self::home_dir() {
            candidates.push(env::user_config_path(&home_dir));
        }

        candidates
    }

    fn home_dir() -> Option<PathBuf> {
        std_env::var("HOME")
            .ok()
            .or_else(|| std_env::var("USERPROFILE").ok())
            .map(PathBuf::from)
    }
}

/// Apply command line overrides on top of loaded options.
///
/// `--fake` wins over `--socket`; `--socket` switches a fake configuration
/// back to the docker backend.
pub fn apply_overrides(options: &mut RelayOptions, args: &Args) {
    if args.fake {
        let exit_code = match options.backend {
            BackendOptions::Fake { exit_code } => exit_code,
            BackendOptions::Docker(_) => 0,
        };
        options.backend = BackendOptions::Fake { exit_code };
        return;
    }

    if let Some(socket) = &args.socket {
        match &mut options.backend {
            BackendOptions::Docker(docker) => docker.socket = socket.clone(),
            BackendOptions::Fake { .. } => {
                options.backend = BackendOptions::Docker(DockerOptions {
                    socket: socket.clone(),
                    ..Default::default()
                });
            }
        }
    }
}
