//! # Relay
//!
//! Runs named containers on behalf of callers and keeps track of which
//! caller session owns which container.
//!
//! ## Architecture Overview
//!
//! - **[`container`]**: The [`ExecutionBackend`] abstraction with a Docker
//!   engine backend and an in-memory fake
//! - **[`relay`]**: The [`Relay`] orchestrator and its session registry
//! - **[`context`]**: Cancellation and deadlines for lifecycle calls
//! - **[`vars`]**: Environment variable maps and the configuration source seam
//! - **[`cli`]**: The `relay` command line front end
//!
//! ## Lifecycle
//!
//! A container goes through pull, create, attach, start and wait. The relay
//! pulls the image as part of [`Relay::create_container`]; the caller drives
//! the remaining steps and decides when to remove the container.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use relay::{Container, Context, Relay, RelayOptions};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let relay = Relay::new(RelayOptions::default())?;
//!     let ctx = Context::new();
//!
//!     let container = Container::new("busybox", "job-1").with_command("echo hello");
//!     relay.create_container(&ctx, &container).await?;
//!     relay.start_container(&ctx, "job-1").await?;
//!     let code = relay.wait_container(&ctx, "job-1").await?;
//!     relay.remove_container(&ctx, "job-1").await?;
//!
//!     println!("exit code: {}", code);
//!     Ok(())
//! }
//! ```

/// Container model, backend trait and backend implementations.
pub mod container;

/// Cancellation tokens and deadlines threaded through lifecycle calls.
pub mod context;

/// Relay orchestration, options and the session registry.
pub mod relay;

/// Environment variable maps and configuration sources.
pub mod vars;

/// Environment constants and path utilities.
pub mod env;

// CLI module for command-line interface
pub mod cli;

pub use container::{
    BackendKind, Container, ContainerError, ExecutionBackend, FakeBackend, LifecycleStep,
};
pub use context::{CancelReason, Context};
pub use relay::{
    BackendOptions, DockerOptions, Relay, RelayOptions, SessionGenerator, SessionRegistry,
};
pub use vars::Vars;
