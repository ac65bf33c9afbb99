//! Container model and execution backends.
//!
//! This module defines the unit of work the relay runs ([`Container`]) and the
//! capability contract every execution backend implements
//! ([`ExecutionBackend`]). Two backends ship with the crate:
//!
//! - [`DockerBackend`]: talks to a Docker-compatible engine through bollard
//!   (requires the `docker` feature, enabled by default)
//! - [`FakeBackend`]: in-memory stand-in with scripted failures and a call log
//!
//! ## Usage
//!
//! ```rust,no_run
//! use relay::container::{Container, ExecutionBackend, FakeBackend};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let backend = FakeBackend::new();
//!     let container = Container::new("busybox", "job-1");
//!
//!     backend.pull(&container).await?;
//!     backend.create(&container).await?;
//!     backend.start("job-1").await?;
//!     let code = backend.wait("job-1").await?;
//!     println!("exited with {}", code);
//!     Ok(())
//! }
//! ```

mod backend;
#[cfg(feature = "docker")]
mod client;
mod fake;
#[cfg(feature = "docker")]
mod image;
#[cfg(feature = "docker")]
mod interactive;
mod model;

pub use backend::{BackendKind, ExecutionBackend, InputStream, LifecycleStep, OutputStream};
#[cfg(feature = "docker")]
pub use client::DockerBackend;
pub use fake::{FakeBackend, FakeCall, FakeState};
#[cfg(feature = "docker")]
pub use image::{DOCKER_HUB_SERVER, ImageReference};
pub use model::Container;

use crate::context::CancelReason;

/// Container lifecycle errors.
///
/// Each backend step has its own variant so callers can tell which part of the
/// `pull -> create -> attach -> start -> wait` sequence failed.
#[derive(Debug, thiserror::Error)]
pub enum ContainerError {
    /// Image could not be resolved or fetched
    #[error("Pull error for image {image}: {reason}")]
    Pull { image: String, reason: String },

    /// Container could not be materialized (invalid spec, name collision)
    #[error("Create error for container {name}: {reason}")]
    Create { name: String, reason: String },

    /// Stream bridging failed or the container does not exist
    #[error("Attach error for container {name}: {reason}")]
    Attach { name: String, reason: String },

    /// Container could not be started
    #[error("Start error for container {name}: {reason}")]
    Start { name: String, reason: String },

    /// Wait protocol failed (a nonzero exit code is not an error)
    #[error("Wait error for container {name}: {reason}")]
    Wait { name: String, reason: String },

    /// Container could not be removed
    #[error("Remove error for container {name}: {reason}")]
    Remove { name: String, reason: String },

    /// Invalid options at construction time
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The session generator kept returning ids that are already registered
    #[error("Session generator produced {attempts} ids already in use")]
    SessionIdsExhausted { attempts: usize },

    /// Context canceled or deadline exceeded during a blocking call
    #[error("{step} cancelled: {reason}")]
    Cancelled {
        step: LifecycleStep,
        reason: CancelReason,
    },

    /// Local stream error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ContainerError {
    /// Whether this error came from a canceled or expired context.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ContainerError::Cancelled { .. })
    }

    /// The lifecycle step this error belongs to, if any.
    pub fn step(&self) -> Option<LifecycleStep> {
        match self {
            ContainerError::Pull { .. } => Some(LifecycleStep::Pull),
            ContainerError::Create { .. } => Some(LifecycleStep::Create),
            ContainerError::Attach { .. } => Some(LifecycleStep::Attach),
            ContainerError::Start { .. } => Some(LifecycleStep::Start),
            ContainerError::Wait { .. } => Some(LifecycleStep::Wait),
            ContainerError::Remove { .. } => Some(LifecycleStep::Remove),
            ContainerError::Cancelled { step, .. } => Some(*step),
            ContainerError::Configuration(_)
            | ContainerError::SessionIdsExhausted { .. }
            | ContainerError::Io(_) => None,
        }
    }

    /// Build the step-specific error for `target` (image for pulls, name otherwise).
    pub fn for_step(step: LifecycleStep, target: &str, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        match step {
            LifecycleStep::Pull => ContainerError::Pull {
                image: target.to_string(),
                reason,
            },
            LifecycleStep::Create => ContainerError::Create {
                name: target.to_string(),
                reason,
            },
            LifecycleStep::Attach => ContainerError::Attach {
                name: target.to_string(),
                reason,
            },
            LifecycleStep::Start => ContainerError::Start {
                name: target.to_string(),
                reason,
            },
            LifecycleStep::Wait => ContainerError::Wait {
                name: target.to_string(),
                reason,
            },
            LifecycleStep::Remove => ContainerError::Remove {
                name: target.to_string(),
                reason,
            },
        }
    }
}

/// Result type for container operations.
pub type Result<T> = std::result::Result<T, ContainerError>;
