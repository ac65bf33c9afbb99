//! In-memory execution backend.
//!
//! Keeps container state in a map, echoes attached input back to the output
//! sink and records every call so tests can assert on sequencing.

use super::{
    BackendKind, Container, ContainerError, ExecutionBackend, InputStream, LifecycleStep,
    OutputStream, Result,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::io::AsyncWriteExt;
use tokio::sync::watch;
use tracing::debug;

/// State of a container known to the fake backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FakeState {
    Created,
    Running,
    Exited(i64),
}

/// One recorded backend call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FakeCall {
    pub step: LifecycleStep,
    /// Image for pulls, container name otherwise
    pub target: String,
}

#[derive(Debug, Default)]
struct Inner {
    containers: HashMap<String, FakeState>,
    images: Vec<String>,
    calls: Vec<FakeCall>,
    failures: HashMap<LifecycleStep, String>,
    exit_codes: HashMap<String, i64>,
}

/// No-op backend for tests and dry runs.
#[derive(Debug)]
pub struct FakeBackend {
    inner: Mutex<Inner>,
    default_exit_code: Mutex<i64>,
    wait_gate: watch::Sender<bool>,
}

impl Default for FakeBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeBackend {
    /// A fake that succeeds at every step and reports exit code 0.
    pub fn new() -> Self {
        let (wait_gate, _) = watch::channel(false);
        Self {
            inner: Mutex::new(Inner::default()),
            default_exit_code: Mutex::new(0),
            wait_gate,
        }
    }

    /// Report `code` from every wait without a per-container override.
    pub fn with_exit_code(self, code: i64) -> Self {
        self.set_exit_code(code);
        self
    }

    pub fn set_exit_code(&self, code: i64) {
        *self
            .default_exit_code
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = code;
    }

    /// Report `code` when waiting on `name`.
    pub fn set_container_exit_code(&self, name: impl Into<String>, code: i64) {
        self.lock().exit_codes.insert(name.into(), code);
    }

    /// Fail every subsequent call to `step` with `reason`.
    pub fn fail_on(&self, step: LifecycleStep, reason: impl Into<String>) {
        self.lock().failures.insert(step, reason.into());
    }

    pub fn clear_failures(&self) {
        self.lock().failures.clear();
    }

    /// Make waits block until [`FakeBackend::release_wait`].
    pub fn hold_wait(&self) {
        self.wait_gate.send_replace(true);
    }

    pub fn release_wait(&self) {
        self.wait_gate.send_replace(false);
    }

    /// Every call made so far, in order.
    pub fn calls(&self) -> Vec<FakeCall> {
        self.lock().calls.clone()
    }

    /// Number of calls made to `step`.
    pub fn call_count(&self, step: LifecycleStep) -> usize {
        self.lock().calls.iter().filter(|c| c.step == step).count()
    }

    /// Current state of `name`, if it exists.
    pub fn state(&self, name: &str) -> Option<FakeState> {
        self.lock().containers.get(name).copied()
    }

    /// Whether `image` has been pulled.
    pub fn has_image(&self, image: &str) -> bool {
        self.lock().images.iter().any(|i| i == image)
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record the call and return the scripted failure for `step`, if any.
    fn record(&self, step: LifecycleStep, target: &str) -> Result<()> {
        let mut inner = self.lock();
        inner.calls.push(FakeCall {
            step,
            target: target.to_string(),
        });
        debug!("Fake backend {} {}", step, target);
        match inner.failures.get(&step) {
            Some(reason) => Err(ContainerError::for_step(step, target, reason.clone())),
            None => Ok(()),
        }
    }

    fn require(&self, step: LifecycleStep, name: &str) -> Result<FakeState> {
        self.state(name)
            .ok_or_else(|| ContainerError::for_step(step, name, "no such container"))
    }
}

#[async_trait]
impl ExecutionBackend for FakeBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Fake
    }

    async fn pull(&self, container: &Container) -> Result<()> {
        self.record(LifecycleStep::Pull, &container.image)?;
        let mut inner = self.lock();
        if !inner.images.contains(&container.image) {
            inner.images.push(container.image.clone());
        }
        Ok(())
    }

    async fn create(&self, container: &Container) -> Result<()> {
        self.record(LifecycleStep::Create, &container.name)?;
        if container.image.is_empty() {
            return Err(ContainerError::for_step(
                LifecycleStep::Create,
                &container.name,
                "image is required",
            ));
        }

        let mut inner = self.lock();
        if inner.containers.contains_key(&container.name) {
            return Err(ContainerError::for_step(
                LifecycleStep::Create,
                &container.name,
                "name already in use",
            ));
        }
        inner
            .containers
            .insert(container.name.clone(), FakeState::Created);
        Ok(())
    }

    async fn attach(
        &self,
        name: &str,
        input: InputStream<'_>,
        output: OutputStream<'_>,
    ) -> Result<()> {
        self.record(LifecycleStep::Attach, name)?;
        self.require(LifecycleStep::Attach, name)?;

        let copied = tokio::io::copy(&mut *input, &mut *output).await?;
        output.flush().await?;
        debug!("Fake backend echoed {} bytes for {}", copied, name);
        Ok(())
    }

    async fn start(&self, name: &str) -> Result<()> {
        self.record(LifecycleStep::Start, name)?;
        match self.require(LifecycleStep::Start, name)? {
            FakeState::Created => {
                self.lock()
                    .containers
                    .insert(name.to_string(), FakeState::Running);
                Ok(())
            }
            FakeState::Running => Ok(()),
            FakeState::Exited(_) => Err(ContainerError::for_step(
                LifecycleStep::Start,
                name,
                "container already exited",
            )),
        }
    }

    async fn wait(&self, name: &str) -> Result<i64> {
        self.record(LifecycleStep::Wait, name)?;
        if self.require(LifecycleStep::Wait, name)? == FakeState::Created {
            return Err(ContainerError::for_step(
                LifecycleStep::Wait,
                name,
                "container not running",
            ));
        }

        let mut gate = self.wait_gate.subscribe();
        if gate.wait_for(|held| !*held).await.is_err() {
            return Err(ContainerError::for_step(
                LifecycleStep::Wait,
                name,
                "backend shut down",
            ));
        }

        let default_code = *self
            .default_exit_code
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let mut inner = self.lock();
        let code = inner.exit_codes.get(name).copied().unwrap_or(default_code);
        inner
            .containers
            .insert(name.to_string(), FakeState::Exited(code));
        Ok(code)
    }

    async fn remove(&self, name: &str) -> Result<()> {
        self.record(LifecycleStep::Remove, name)?;
        match self.lock().containers.remove(name) {
            Some(_) => Ok(()),
            None => Err(ContainerError::for_step(
                LifecycleStep::Remove,
                name,
                "no such container",
            )),
        }
    }
}
