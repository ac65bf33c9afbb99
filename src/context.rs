//! Cancellation and deadline context for lifecycle calls.
//!
//! Every relay operation takes a [`Context`]. The backend call is raced against
//! the context's cancellation token and optional deadline; whichever fires first
//! wins and the backend future is dropped, which aborts the in-flight engine
//! request.

use crate::container::{ContainerError, LifecycleStep, Result};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Why a context stopped a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// The token was cancelled explicitly
    Canceled,
    /// The deadline passed
    DeadlineExceeded,
}

impl std::fmt::Display for CancelReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CancelReason::Canceled => write!(f, "context canceled"),
            CancelReason::DeadlineExceeded => write!(f, "deadline exceeded"),
        }
    }
}

/// Cancellation token plus optional deadline.
///
/// Cloning shares the token. [`Context::child`] derives a context that is
/// cancelled with its parent but can also be cancelled on its own, so an
/// attach and a wait for the same run can be stopped independently.
#[derive(Debug, Clone, Default)]
pub struct Context {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl Context {
    /// A context that never expires unless cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap an existing cancellation token.
    pub fn from_token(token: CancellationToken) -> Self {
        Self {
            token,
            deadline: None,
        }
    }

    /// Same token, deadline `timeout` from now (the earlier deadline wins).
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Same token, with `deadline` (the earlier deadline wins).
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let deadline = match self.deadline {
            Some(existing) if existing < deadline => existing,
            _ => deadline,
        };
        Self {
            token: self.token.clone(),
            deadline: Some(deadline),
        }
    }

    /// Derive a child context cancelled together with this one.
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
        }
    }

    /// Cancel this context and all its children.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// The underlying cancellation token.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Reason this context is already done, if it is.
    pub fn done(&self) -> Option<CancelReason> {
        if self.token.is_cancelled() {
            Some(CancelReason::Canceled)
        } else if self.deadline.is_some_and(|d| d <= Instant::now()) {
            Some(CancelReason::DeadlineExceeded)
        } else {
            None
        }
    }

    /// Drive `fut` until it completes or this context ends.
    ///
    /// # Errors
    ///
    /// Returns [`ContainerError::Cancelled`] for `step` when the token is
    /// cancelled or the deadline passes first; otherwise the future's own result.
    pub async fn run<T, F>(&self, step: LifecycleStep, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        if let Some(reason) = self.done() {
            debug!("Skipping {}: {}", step, reason);
            return Err(ContainerError::Cancelled { step, reason });
        }

        let expired = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = self.token.cancelled() => {
                debug!("{} cancelled", step);
                Err(ContainerError::Cancelled { step, reason: CancelReason::Canceled })
            }
            _ = expired => {
                debug!("{} hit its deadline", step);
                Err(ContainerError::Cancelled { step, reason: CancelReason::DeadlineExceeded })
            }
            result = fut => result,
        }
    }
}
