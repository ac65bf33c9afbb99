//! Docker engine backend.
//!
//! Wraps the bollard Docker API. Connection parameters come from
//! [`DockerOptions`]; building the client never contacts the daemon, use
//! [`DockerBackend::ping`] for that.

use crate::container::image::ImageReference;
use crate::container::interactive;
use crate::container::{
    BackendKind, Container, ContainerError, ExecutionBackend, InputStream, LifecycleStep,
    OutputStream, Result,
};
use crate::env::MANAGED_LABEL;
use crate::relay::{DockerOptions, RegistryAuth};
use async_trait::async_trait;
use bollard::Docker;
use bollard::models::ContainerCreateBody;
use bollard::query_parameters::{
    AttachContainerOptionsBuilder, CreateContainerOptionsBuilder, CreateImageOptionsBuilder,
    RemoveContainerOptionsBuilder, StartContainerOptions, WaitContainerOptions,
};
use futures::stream::StreamExt;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

/// Where the engine API is reached.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Endpoint {
    /// `DOCKER_HOST` or the platform default socket
    LocalDefaults,
    /// Unix socket path or `unix://` URL
    Socket(String),
    /// Plain HTTP over TCP
    Http(String),
    /// TLS over TCP with client material from a directory
    Tls { address: String, cert_dir: PathBuf },
}

impl Endpoint {
    fn resolve(options: &DockerOptions) -> Result<Self> {
        let socket = options.socket.trim();
        if socket.is_empty() {
            return Ok(Endpoint::LocalDefaults);
        }
        if socket.starts_with('/') {
            return Ok(Endpoint::Socket(socket.to_string()));
        }

        let url = Url::parse(socket).map_err(|e| {
            ContainerError::Configuration(format!("Invalid docker socket '{}': {}", socket, e))
        })?;

        match url.scheme() {
            "unix" => Ok(Endpoint::Socket(socket.to_string())),
            "tcp" | "http" | "https" => {
                if url.host_str().is_none() {
                    return Err(ContainerError::Configuration(format!(
                        "Docker endpoint '{}' has no host",
                        socket
                    )));
                }
                match &options.cert_path {
                    Some(cert_dir) => Ok(Endpoint::Tls {
                        address: socket.to_string(),
                        cert_dir: cert_dir.clone(),
                    }),
                    None => Ok(Endpoint::Http(socket.to_string())),
                }
            }
            other => Err(ContainerError::Configuration(format!(
                "Unsupported docker endpoint scheme '{}' in '{}'",
                other, socket
            ))),
        }
    }
}

/// TLS client material inside a certificate directory.
fn tls_files(cert_dir: &Path) -> Result<(PathBuf, PathBuf, PathBuf)> {
    let key = cert_dir.join("key.pem");
    let cert = cert_dir.join("cert.pem");
    let ca = cert_dir.join("ca.pem");
    for file in [&key, &cert, &ca] {
        if !file.is_file() {
            return Err(ContainerError::Configuration(format!(
                "Missing TLS file {}",
                file.display()
            )));
        }
    }
    Ok((key, cert, ca))
}

/// Execution backend backed by a Docker-compatible engine.
#[derive(Clone)]
pub struct DockerBackend {
    docker: Arc<Docker>,
    organization: Option<String>,
    auth: HashMap<String, RegistryAuth>,
}

impl std::fmt::Debug for DockerBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DockerBackend")
            .field("organization", &self.organization)
            .field("registries", &self.auth.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl DockerBackend {
    /// Build a client for the endpoint described by `options`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for malformed endpoints or missing TLS
    /// material.
    pub fn new(options: &DockerOptions) -> Result<Self> {
        let docker = Self::connect(options)?;
        Ok(Self {
            docker: Arc::new(docker),
            organization: options.organization.clone().filter(|o| !o.is_empty()),
            auth: options.auth.clone(),
        })
    }

    fn connect(options: &DockerOptions) -> Result<Docker> {
        let timeout = options.timeout_secs;
        let endpoint = Endpoint::resolve(options)?;
        debug!("Connecting to container engine via {:?}", endpoint);

        let connected = match &endpoint {
            Endpoint::LocalDefaults => Docker::connect_with_local_defaults(),
            Endpoint::Socket(path) => {
                Docker::connect_with_socket(path, timeout, bollard::API_DEFAULT_VERSION)
            }
            Endpoint::Http(address) => {
                Docker::connect_with_http(address, timeout, bollard::API_DEFAULT_VERSION)
            }
            Endpoint::Tls { address, cert_dir } => {
                let (key, cert, ca) = tls_files(cert_dir)?;
                Docker::connect_with_ssl(
                    address,
                    &key,
                    &cert,
                    &ca,
                    timeout,
                    bollard::API_DEFAULT_VERSION,
                )
            }
        };

        let docker = connected.map_err(|e| {
            ContainerError::Configuration(format!("Failed to configure docker client: {}", e))
        })?;
        info!("Configured container engine client ({:?})", endpoint);
        Ok(docker)
    }

    /// Ping the engine to verify connectivity.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the engine does not answer.
    pub async fn ping(&self) -> Result<()> {
        self.docker.ping().await.map_err(|e| {
            ContainerError::Configuration(format!("Failed to ping container engine: {}", e))
        })?;
        debug!("Container engine ping successful");
        Ok(())
    }

    /// Get the underlying bollard client.
    pub fn docker(&self) -> &Docker {
        &self.docker
    }

    /// Resolve `image` against the configured organization.
    pub fn resolve_image(&self, image: &str) -> Result<ImageReference> {
        Ok(ImageReference::parse(image)?.qualify(self.organization.as_deref()))
    }
}

/// Map an engine error to the step error, naming 404s explicitly.
fn step_error(step: LifecycleStep, target: &str, error: bollard::errors::Error) -> ContainerError {
    match error {
        bollard::errors::Error::DockerResponseServerError {
            status_code: 404,
            message,
        } => ContainerError::for_step(step, target, format!("not found: {}", message)),
        e => ContainerError::for_step(step, target, e.to_string()),
    }
}

#[async_trait]
impl ExecutionBackend for DockerBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Docker
    }

    async fn pull(&self, container: &Container) -> Result<()> {
        let reference = self.resolve_image(&container.image)?;
        let image = reference.to_string();
        let from_image = reference.from_image();

        let mut options = CreateImageOptionsBuilder::default().from_image(&from_image);
        if let Some(tag) = reference.pull_tag() {
            options = options.tag(tag);
        }
        let credentials = reference.credentials(&self.auth);
        if credentials.is_some() {
            debug!("Using credentials for {}", reference.server_address());
        }

        info!("Pulling image: {}", image);
        let mut stream = self
            .docker
            .create_image(Some(options.build()), None, credentials);

        while let Some(result) = stream.next().await {
            match result {
                Ok(progress) => {
                    if let Some(error) = progress.error {
                        return Err(ContainerError::for_step(LifecycleStep::Pull, &image, error));
                    }
                    if let Some(status) = progress.status {
                        debug!("Pull {}: {}", image, status);
                    }
                }
                Err(e) => return Err(step_error(LifecycleStep::Pull, &image, e)),
            }
        }

        info!("Successfully pulled image: {}", image);
        Ok(())
    }

    async fn create(&self, container: &Container) -> Result<()> {
        let reference = self.resolve_image(&container.image).map_err(|e| {
            ContainerError::for_step(LifecycleStep::Create, &container.name, e.to_string())
        })?;

        let options = CreateContainerOptionsBuilder::default()
            .name(&container.name)
            .build();

        let mut labels = HashMap::new();
        labels.insert(MANAGED_LABEL.to_string(), "true".to_string());

        let body = ContainerCreateBody {
            image: Some(reference.to_string()),
            cmd: container.command_args(),
            env: Some(container.env_list()),
            attach_stdin: Some(container.attach),
            attach_stdout: Some(container.attach),
            attach_stderr: Some(container.attach),
            open_stdin: Some(container.attach),
            stdin_once: Some(container.attach),
            tty: Some(container.attach),
            labels: Some(labels),
            ..Default::default()
        };

        debug!("Creating container: {}", container.name);
        let response = self
            .docker
            .create_container(Some(options), body)
            .await
            .map_err(|e| step_error(LifecycleStep::Create, &container.name, e))?;

        for warning in &response.warnings {
            warn!("Create {}: {}", container.name, warning);
        }
        info!("Created container: {} ({})", container.name, response.id);
        Ok(())
    }

    async fn attach(
        &self,
        name: &str,
        input: InputStream<'_>,
        output: OutputStream<'_>,
    ) -> Result<()> {
        debug!("Attaching to container: {}", name);

        let options = AttachContainerOptionsBuilder::default()
            .stdin(true)
            .stdout(true)
            .stderr(true)
            .stream(true)
            .logs(true)
            .build();

        let attached = self
            .docker
            .attach_container(name, Some(options))
            .await
            .map_err(|e| step_error(LifecycleStep::Attach, name, e))?;

        interactive::bridge(name, attached.output, attached.input, input, output).await?;
        info!("Detached from container: {}", name);
        Ok(())
    }

    async fn start(&self, name: &str) -> Result<()> {
        debug!("Starting container: {}", name);
        self.docker
            .start_container(name, None::<StartContainerOptions>)
            .await
            .map_err(|e| step_error(LifecycleStep::Start, name, e))?;
        info!("Started container: {}", name);
        Ok(())
    }

    async fn wait(&self, name: &str) -> Result<i64> {
        debug!("Waiting for container: {}", name);
        let mut stream = self.docker.wait_container(name, None::<WaitContainerOptions>);

        let mut exit_code = None;
        while let Some(result) = stream.next().await {
            match result {
                Ok(response) => {
                    if let Some(error) = response.error.and_then(|e| e.message) {
                        return Err(ContainerError::for_step(LifecycleStep::Wait, name, error));
                    }
                    exit_code = Some(response.status_code);
                }
                // bollard reports a nonzero exit status as an error; it is a normal exit here.
                Err(bollard::errors::Error::DockerContainerWaitError { code, .. }) => {
                    exit_code = Some(code);
                }
                Err(e) => return Err(step_error(LifecycleStep::Wait, name, e)),
            }
        }

        let code = exit_code.ok_or_else(|| {
            ContainerError::for_step(LifecycleStep::Wait, name, "wait stream ended without a status")
        })?;
        info!("Container {} exited with code {}", name, code);
        Ok(code)
    }

    async fn remove(&self, name: &str) -> Result<()> {
        debug!("Removing container: {}", name);
        let options = RemoveContainerOptionsBuilder::default()
            .force(true)
            .v(true)
            .build();
        self.docker
            .remove_container(name, Some(options))
            .await
            .map_err(|e| step_error(LifecycleStep::Remove, name, e))?;
        info!("Removed container: {}", name);
        Ok(())
    }
}
