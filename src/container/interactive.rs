//! Stdio bridging for attached containers.
//!
//! Copies the caller's input into the container's stdin while streaming the
//! container's output frames into the caller's sink. The bridge ends when the
//! container side closes its output stream; input reaching EOF only closes the
//! container's stdin.

use crate::container::{ContainerError, InputStream, LifecycleStep, OutputStream, Result};
use bollard::container::LogOutput;
use futures::stream::{Stream, StreamExt};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};

/// Bridge `input` to `container_stdin` and `container_output` to `output`.
///
/// # Errors
///
/// Returns an attach error if the output stream reports an engine error, or an
/// IO error if writing to `output` fails.
pub(crate) async fn bridge<S, E, W>(
    name: &str,
    mut container_output: S,
    mut container_stdin: W,
    input: InputStream<'_>,
    output: OutputStream<'_>,
) -> Result<()>
where
    S: Stream<Item = std::result::Result<LogOutput, E>> + Unpin,
    E: std::fmt::Display,
    W: AsyncWrite + Unpin,
{
    let forward_input = async {
        let copied = tokio::io::copy(input, &mut container_stdin).await;
        if let Err(e) = container_stdin.shutdown().await {
            debug!("Failed to close stdin of {}: {}", name, e);
        }
        copied
    };

    let forward_output = async {
        let mut total = 0usize;
        while let Some(frame) = container_output.next().await {
            let bytes = frame
                .map_err(|e| ContainerError::for_step(LifecycleStep::Attach, name, e.to_string()))?
                .into_bytes();
            output.write_all(&bytes).await?;
            output.flush().await?;
            total += bytes.len();
        }
        debug!("Output stream of {} closed after {} bytes", name, total);
        Ok::<(), ContainerError>(())
    };

    tokio::pin!(forward_input, forward_output);
    let mut input_open = true;

    loop {
        tokio::select! {
            copied = &mut forward_input, if input_open => {
                input_open = false;
                match copied {
                    Ok(n) => debug!("Forwarded {} bytes to stdin of {}", n, name),
                    Err(e) => warn!("Failed to write to stdin of {}: {}", name, e),
                }
            }
            result = &mut forward_output => return result,
        }
    }
}
