//! Execution backend contract.

use super::{Container, Result};
use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

/// Input source bridged to a container's stdin.
pub type InputStream<'a> = &'a mut (dyn AsyncRead + Send + Unpin);

/// Output sink receiving a container's stdout/stderr.
pub type OutputStream<'a> = &'a mut (dyn AsyncWrite + Send + Unpin);

/// One step of the container lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleStep {
    Pull,
    Create,
    Attach,
    Start,
    Wait,
    Remove,
}

impl std::fmt::Display for LifecycleStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            LifecycleStep::Pull => "pull",
            LifecycleStep::Create => "create",
            LifecycleStep::Attach => "attach",
            LifecycleStep::Start => "start",
            LifecycleStep::Wait => "wait",
            LifecycleStep::Remove => "remove",
        };
        f.write_str(name)
    }
}

/// Which backend implementation is in use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// Docker-compatible engine
    Docker,
    /// In-memory fake
    Fake,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendKind::Docker => write!(f, "Docker"),
            BackendKind::Fake => write!(f, "Fake"),
        }
    }
}

/// Capability interface over a container engine.
///
/// Implementations must be safe to call concurrently for distinct container
/// names. None of the methods take a cancellation context: callers race the
/// returned future against one and drop it on cancellation, so implementations
/// must not leave shared state inconsistent at an `.await` point.
#[async_trait]
pub trait ExecutionBackend: Send + Sync {
    /// Backend implementation in use.
    fn kind(&self) -> BackendKind;

    /// Ensure `container.image` is available locally.
    async fn pull(&self, container: &Container) -> Result<()>;

    /// Materialize a container instance from `container`.
    async fn create(&self, container: &Container) -> Result<()>;

    /// Bridge stdin from `input` and stdout/stderr into `output`.
    ///
    /// Returns once the backend closes the stream (container exit or detach).
    async fn attach(
        &self,
        name: &str,
        input: InputStream<'_>,
        output: OutputStream<'_>,
    ) -> Result<()>;

    /// Transition a created container to running.
    async fn start(&self, name: &str) -> Result<()>;

    /// Block until the container exits and return its exit code.
    async fn wait(&self, name: &str) -> Result<i64>;

    /// Force-remove the container.
    async fn remove(&self, name: &str) -> Result<()>;
}
