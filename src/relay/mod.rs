//! The relay: lifecycle orchestration plus session bookkeeping.
//!
//! A [`Relay`] owns one [`ExecutionBackend`] and a [`SessionRegistry`]. Each
//! lifecycle call is a thin, cancellable pass-through to the backend, except
//! [`Relay::create_container`] which sequences `pull` before `create`.
//!
//! ```rust,no_run
//! use relay::{Context, Container, Relay, RelayOptions};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let relay = Relay::new(RelayOptions::fake())?;
//!     let ctx = Context::new();
//!
//!     let container = Container::new("busybox", "job-1");
//!     let session = relay.register_session(container.clone()).await?;
//!
//!     relay.create_container(&ctx, &container).await?;
//!     relay.start_container(&ctx, "job-1").await?;
//!     let code = relay.wait_container(&ctx, "job-1").await?;
//!
//!     println!("session {} exited with {}", session, code);
//!     Ok(())
//! }
//! ```

mod options;
mod session;

pub use options::{BackendOptions, DockerOptions, RegistryAuth, RelayOptions, TcpOptions};
pub use session::{SessionGenerator, SessionRegistry};

use crate::container::{
    BackendKind, Container, ContainerError, ExecutionBackend, FakeBackend, LifecycleStep, Result,
};
use crate::context::Context;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info, warn};

/// How many generated ids `register_session` tries before giving up.
pub const MAX_SESSION_ID_ATTEMPTS: usize = 8;

/// Orchestrates container lifecycles against one execution backend.
pub struct Relay {
    host: String,
    backend: Arc<dyn ExecutionBackend>,
    session_generator: SessionGenerator,
    sessions: SessionRegistry,
}

impl std::fmt::Debug for Relay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Relay")
            .field("host", &self.host)
            .field("backend", &self.backend.kind())
            .finish_non_exhaustive()
    }
}

impl Relay {
    /// Build a relay and the backend selected by `options.backend`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the options are invalid or the backend
    /// client cannot be built.
    pub fn new(options: RelayOptions) -> Result<Self> {
        options.validate()?;
        let backend = build_backend(&options.backend.clone().normalized())?;
        Ok(Self::assemble(options, backend))
    }

    /// Build a relay around an already constructed backend.
    ///
    /// `options.backend` is ignored.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the options are invalid.
    pub fn with_backend(options: RelayOptions, backend: Arc<dyn ExecutionBackend>) -> Result<Self> {
        options.validate()?;
        Ok(Self::assemble(options, backend))
    }

    fn assemble(options: RelayOptions, backend: Arc<dyn ExecutionBackend>) -> Self {
        let host = options.tcp.address();
        info!("Relay at {} using {} backend", host, backend.kind());
        Self {
            host,
            backend,
            session_generator: options.session_generator.unwrap_or_default(),
            sessions: SessionRegistry::new(),
        }
    }

    /// Rendezvous address (`host:port`) for building attach URLs.
    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn backend(&self) -> &Arc<dyn ExecutionBackend> {
        &self.backend
    }

    pub fn backend_kind(&self) -> BackendKind {
        self.backend.kind()
    }

    /// Generate a fresh session identifier.
    pub fn new_session_id(&self) -> String {
        self.session_generator.generate()
    }

    /// Record `container` under `id`, replacing any previous entry.
    pub async fn set_container_session(
        &self,
        id: impl Into<String>,
        container: Container,
    ) -> Option<Container> {
        let id = id.into();
        debug!("Session {} -> container {}", id, container.name);
        self.sessions.set(id, container).await
    }

    /// Register `container` under a newly generated session id.
    ///
    /// Ids already present in the registry are never reused; a colliding id
    /// is regenerated up to [`MAX_SESSION_ID_ATTEMPTS`] times.
    ///
    /// # Errors
    ///
    /// Returns [`ContainerError::SessionIdsExhausted`] when every attempt
    /// collided with a registered session.
    pub async fn register_session(&self, container: Container) -> Result<String> {
        let mut container = container;
        for _ in 0..MAX_SESSION_ID_ATTEMPTS {
            let id = self.new_session_id();
            match self.sessions.insert_new(id.clone(), container).await {
                Ok(()) => {
                    debug!("Registered session {}", id);
                    return Ok(id);
                }
                Err(rejected) => {
                    warn!("Session id {} already in use, regenerating", id);
                    container = rejected;
                }
            }
        }

        Err(ContainerError::SessionIdsExhausted {
            attempts: MAX_SESSION_ID_ATTEMPTS,
        })
    }

    /// The container registered for session `id`.
    pub async fn container_session(&self, id: &str) -> Option<Container> {
        self.sessions.get(id).await
    }

    /// Update the caller-observed state recorded for session `id`.
    pub async fn set_session_state(&self, id: &str, state: impl Into<String>) -> bool {
        self.sessions.set_state(id, state).await
    }

    /// Drop the registry entry for session `id`.
    pub async fn remove_container_session(&self, id: &str) -> Option<Container> {
        let removed = self.sessions.remove(id).await;
        if removed.is_some() {
            debug!("Removed session {}", id);
        }
        removed
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.len().await
    }

    /// Whether no sessions are registered.
    pub async fn is_idle(&self) -> bool {
        self.sessions.is_empty().await
    }

    pub async fn has_session(&self, id: &str) -> bool {
        self.sessions.contains(id).await
    }

    /// Copy of every registered session.
    pub async fn sessions(&self) -> HashMap<String, Container> {
        self.sessions.snapshot().await
    }

    /// All registered session ids, sorted.
    pub async fn session_ids(&self) -> Vec<String> {
        self.sessions.ids().await
    }

    /// Pull the container's image, then create the container.
    ///
    /// A failed pull is returned without attempting the create. Nothing is
    /// rolled back when the create fails; the pulled image stays cached.
    pub async fn create_container(&self, ctx: &Context, container: &Container) -> Result<()> {
        ctx.run(LifecycleStep::Pull, self.backend.pull(container))
            .await?;
        ctx.run(LifecycleStep::Create, self.backend.create(container))
            .await
    }

    /// Bridge the container's stdio to `input` and `output` until the stream closes.
    pub async fn attach_to_container<R, W>(
        &self,
        ctx: &Context,
        name: &str,
        input: &mut R,
        output: &mut W,
    ) -> Result<()>
    where
        R: AsyncRead + Send + Unpin,
        W: AsyncWrite + Send + Unpin,
    {
        ctx.run(
            LifecycleStep::Attach,
            self.backend.attach(name, input, output),
        )
        .await
    }

    pub async fn start_container(&self, ctx: &Context, name: &str) -> Result<()> {
        ctx.run(LifecycleStep::Start, self.backend.start(name)).await
    }

    /// Wait for the container to exit and return its exit code.
    ///
    /// A nonzero exit code is a successful result.
    pub async fn wait_container(&self, ctx: &Context, name: &str) -> Result<i64> {
        ctx.run(LifecycleStep::Wait, self.backend.wait(name)).await
    }

    /// Force-remove the container.
    pub async fn remove_container(&self, ctx: &Context, name: &str) -> Result<()> {
        ctx.run(LifecycleStep::Remove, self.backend.remove(name))
            .await
    }
}

/// Build the backend named by `options`.
fn build_backend(options: &BackendOptions) -> Result<Arc<dyn ExecutionBackend>> {
    match options {
        BackendOptions::Fake { exit_code } => {
            Ok(Arc::new(FakeBackend::new().with_exit_code(*exit_code)))
        }
        #[cfg(feature = "docker")]
        BackendOptions::Docker(docker) => {
            Ok(Arc::new(crate::container::DockerBackend::new(docker)?))
        }
        #[cfg(not(feature = "docker"))]
        BackendOptions::Docker(_) => Err(crate::container::ContainerError::Configuration(
            "docker backend requires the `docker` feature".to_string(),
        )),
    }
}
