//! Image references and registry credentials.
//!
//! Resolves the image named by a [`Container`](super::Container) into the
//! repository/tag pair the engine expects, qualifies bare names with the
//! configured organization, and picks the registry credentials for a pull.

use crate::container::{ContainerError, LifecycleStep, Result};
use crate::relay::RegistryAuth;
use bollard::auth::DockerCredentials;
use std::collections::HashMap;

/// Server address Docker uses for Docker Hub credentials.
pub const DOCKER_HUB_SERVER: &str = "https://index.docker.io/v1/";

const DEFAULT_TAG: &str = "latest";

/// A parsed image reference: `[registry/]repository[:tag][@digest]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageReference {
    pub registry: Option<String>,
    pub repository: String,
    pub tag: Option<String>,
    pub digest: Option<String>,
}

impl ImageReference {
    /// Parse an image reference.
    ///
    /// # Errors
    ///
    /// Returns a pull error for empty or malformed references.
    pub fn parse(image: &str) -> Result<Self> {
        let invalid = |reason: &str| ContainerError::for_step(LifecycleStep::Pull, image, reason);

        let image = image.trim();
        if image.is_empty() {
            return Err(invalid("empty image reference"));
        }
        if image.chars().any(char::is_whitespace) {
            return Err(invalid("image reference contains whitespace"));
        }

        let (name, digest) = match image.split_once('@') {
            Some((name, digest)) if !digest.is_empty() => (name, Some(digest.to_string())),
            Some(_) => return Err(invalid("empty digest")),
            None => (image, None),
        };

        // A colon after the last slash separates the tag; one before it is a registry port.
        let last_slash = name.rfind('/').map_or(0, |i| i + 1);
        let (path, tag) = match name[last_slash..].rfind(':') {
            Some(i) => {
                let split = last_slash + i;
                let tag = &name[split + 1..];
                if tag.is_empty() {
                    return Err(invalid("empty tag"));
                }
                (&name[..split], Some(tag.to_string()))
            }
            None => (name, None),
        };

        let (registry, repository) = match path.split_once('/') {
            Some((first, rest))
                if first.contains('.') || first.contains(':') || first == "localhost" =>
            {
                (Some(first.to_string()), rest.to_string())
            }
            _ => (None, path.to_string()),
        };

        if repository.is_empty() || repository.split('/').any(str::is_empty) {
            return Err(invalid("empty repository component"));
        }

        Ok(Self {
            registry,
            repository,
            tag,
            digest,
        })
    }

    /// Prefix `organization` onto single-component Docker Hub repositories.
    pub fn qualify(mut self, organization: Option<&str>) -> Self {
        if let Some(org) = organization.filter(|o| !o.is_empty()) {
            if self.registry.is_none() && !self.repository.contains('/') {
                self.repository = format!("{}/{}", org, self.repository);
            }
        }
        self
    }

    /// Image name without tag or digest, including the registry.
    pub fn name(&self) -> String {
        match &self.registry {
            Some(registry) => format!("{}/{}", registry, self.repository),
            None => self.repository.clone(),
        }
    }

    /// Value for the engine's `fromImage` pull parameter.
    pub fn from_image(&self) -> String {
        match &self.digest {
            Some(digest) => format!("{}@{}", self.name(), digest),
            None => self.name(),
        }
    }

    /// Tag to pull; `None` when pinned by digest.
    pub fn pull_tag(&self) -> Option<&str> {
        if self.digest.is_some() {
            None
        } else {
            Some(self.tag.as_deref().unwrap_or(DEFAULT_TAG))
        }
    }

    /// Registry server the credentials are looked up for.
    pub fn server_address(&self) -> &str {
        self.registry.as_deref().unwrap_or(DOCKER_HUB_SERVER)
    }

    /// Credentials from `auth` matching this image's registry.
    pub fn credentials(&self, auth: &HashMap<String, RegistryAuth>) -> Option<DockerCredentials> {
        let wanted = normalize_server(self.server_address());
        auth.iter()
            .find(|(server, _)| normalize_server(server) == wanted)
            .map(|(server, creds)| DockerCredentials {
                username: Some(creds.username.clone()),
                password: Some(creds.password.clone()),
                email: creds.email.clone(),
                serveraddress: Some(server.clone()),
                ..Default::default()
            })
    }
}

impl std::fmt::Display for ImageReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())?;
        if let Some(tag) = &self.tag {
            write!(f, ":{}", tag)?;
        }
        if let Some(digest) = &self.digest {
            write!(f, "@{}", digest)?;
        }
        Ok(())
    }
}

/// Reduce a registry address to its host, folding Docker Hub aliases together.
fn normalize_server(server: &str) -> String {
    let host = server
        .trim_start_matches("https://")
        .trim_start_matches("http://")
        .split('/')
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase();
    match host.as_str() {
        "docker.io" | "index.docker.io" | "registry-1.docker.io" => "docker.io".to_string(),
        _ => host,
    }
}
