//! The `run` command: one container through the whole lifecycle.

use crate::container::Container;
use crate::context::Context;
use crate::relay::Relay;
use anyhow::{Context as _, Result};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info, warn};

/// How long an attach may keep draining output after the container exited.
const ATTACH_DRAIN_GRACE: Duration = Duration::from_secs(2);

/// A single run requested from the command line.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub container: Container,
    pub timeout: Option<Duration>,
    /// Keep the container after it exits instead of removing it
    pub keep: bool,
}

/// Run `request` on `relay`, bridging `input`/`output` when the container attaches.
///
/// The run is registered as a session for its duration and the session's
/// state follows the lifecycle. Returns the container's exit code.
pub async fn execute_run<R, W>(
    relay: &Relay,
    request: &RunRequest,
    input: &mut R,
    output: &mut W,
) -> Result<i64>
where
    R: AsyncRead + Send + Unpin,
    W: AsyncWrite + Send + Unpin,
{
    let ctx = match request.timeout {
        Some(timeout) => Context::new().with_timeout(timeout),
        None => Context::new(),
    };
    let container = &request.container;
    let name = container.name.as_str();

    let session = relay
        .register_session(container.clone())
        .await
        .context("Failed to register session")?;
    info!("Session {} running {} ({})", session, name, container.image);

    let mut created = false;
    let result = run_lifecycle(relay, &ctx, &session, container, &mut created, input, output).await;

    match &result {
        Ok(code) => {
            relay
                .set_session_state(&session, format!("exited({})", code))
                .await;
        }
        Err(e) => {
            relay.set_session_state(&session, "failed").await;
            warn!("Run of {} failed: {:#}", name, e);
        }
    }

    if created && !request.keep {
        // Teardown gets its own context so an expired run can still clean up.
        if let Err(e) = relay.remove_container(&Context::new(), name).await {
            warn!("Failed to remove container {}: {}", name, e);
        }
    }
    relay.remove_container_session(&session).await;

    result
}

async fn run_lifecycle<R, W>(
    relay: &Relay,
    ctx: &Context,
    session: &str,
    container: &Container,
    created: &mut bool,
    input: &mut R,
    output: &mut W,
) -> Result<i64>
where
    R: AsyncRead + Send + Unpin,
    W: AsyncWrite + Send + Unpin,
{
    let name = container.name.as_str();

    relay.set_session_state(session, "creating").await;
    relay
        .create_container(ctx, container)
        .await
        .with_context(|| format!("Failed to create container {}", name))?;
    *created = true;
    relay.set_session_state(session, "created").await;

    let start_and_wait = async {
        relay
            .start_container(ctx, name)
            .await
            .with_context(|| format!("Failed to start container {}", name))?;
        relay.set_session_state(session, "running").await;

        relay
            .wait_container(ctx, name)
            .await
            .with_context(|| format!("Failed waiting for container {}", name))
    };

    if !container.attach {
        return start_and_wait.await;
    }

    let attach_ctx = ctx.child();
    let drain = attach_ctx.clone();
    let lifecycle = async {
        let result = start_and_wait.await;
        tokio::spawn(async move {
            tokio::time::sleep(ATTACH_DRAIN_GRACE).await;
            drain.cancel();
        });
        result
    };

    let (attached, code) = tokio::join!(
        relay.attach_to_container(&attach_ctx, name, input, output),
        lifecycle
    );

    match attached {
        Ok(()) => debug!("Attach to {} finished", name),
        Err(e) if e.is_cancelled() => debug!("Attach to {} stopped: {}", name, e),
        Err(e) => warn!("Attach to {} failed: {}", name, e),
    }

    code
}
