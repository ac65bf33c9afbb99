//! Relay construction options.
//!
//! Options deserialize from TOML (see [`RelayOptions::from_toml_file`]). The
//! backend is selected by the `kind` tag of the `[backend]` table:
//!
//! ```toml
//! [tcp]
//! host = "relay.internal"
//! port = 9090
//!
//! [backend]
//! kind = "docker"
//! organization = "acme"
//! socket = "unix:///var/run/docker.sock"
//! ```

use super::SessionGenerator;
use crate::container::{ContainerError, Result};
use crate::env;
use crate::vars::Vars;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Address the relay advertises for rendezvous.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TcpOptions {
    /// Host the relay's TCP server runs on
    #[serde(default = "default_host")]
    pub host: String,
    /// Port the relay's TCP server runs on
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    env::DEFAULT_TCP_HOST.to_string()
}

fn default_port() -> u16 {
    env::DEFAULT_TCP_PORT
}

impl Default for TcpOptions {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl TcpOptions {
    /// `host:port`.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Credentials for one registry.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryAuth {
    pub username: String,
    pub password: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl std::fmt::Debug for RegistryAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryAuth")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("email", &self.email)
            .finish()
    }
}

/// Docker engine connection options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DockerOptions {
    /// Namespace prefixed onto bare image names
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization: Option<String>,

    /// Engine endpoint: empty for local defaults, a socket path, or a
    /// `unix://`, `tcp://`, `http://` or `https://` URL
    #[serde(default)]
    pub socket: String,

    /// Directory holding `cert.pem`, `key.pem` and `ca.pem` for TLS endpoints
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cert_path: Option<PathBuf>,

    /// Registry credentials keyed by server address
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub auth: HashMap<String, RegistryAuth>,

    /// Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    env::DEFAULT_DOCKER_TIMEOUT_SECS
}

impl Default for DockerOptions {
    fn default() -> Self {
        Self {
            organization: None,
            socket: String::new(),
            cert_path: None,
            auth: HashMap::new(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Which execution backend the relay delegates to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackendOptions {
    /// Docker-compatible engine
    Docker(DockerOptions),

    /// In-memory backend; never touches the network
    Fake {
        /// Exit code reported by every wait
        #[serde(default)]
        exit_code: i64,
    },
}

impl Default for BackendOptions {
    fn default() -> Self {
        Self::Docker(DockerOptions::default())
    }
}

impl BackendOptions {
    /// Whether these options select the in-memory backend.
    pub fn is_fake(&self) -> bool {
        matches!(self.clone().normalized(), BackendOptions::Fake { .. })
    }

    /// Fold the `socket = "fake"` docker setting into [`BackendOptions::Fake`].
    pub fn normalized(self) -> Self {
        match self {
            BackendOptions::Docker(docker) if docker.socket.trim() == env::FAKE_SOCKET => {
                BackendOptions::Fake { exit_code: 0 }
            }
            other => other,
        }
    }
}

/// Options for [`Relay::new`](super::Relay::new).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RelayOptions {
    /// Session id generator; the random UUID generator when unset
    #[serde(skip)]
    pub session_generator: Option<SessionGenerator>,

    #[serde(default)]
    pub tcp: TcpOptions,

    #[serde(default)]
    pub backend: BackendOptions,

    /// Per-application environment, keyed by application name
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub apps: HashMap<String, Vars>,
}

impl RelayOptions {
    /// Options selecting the in-memory backend.
    pub fn fake() -> Self {
        Self {
            backend: BackendOptions::Fake { exit_code: 0 },
            ..Default::default()
        }
    }

    pub fn with_session_generator(mut self, generator: SessionGenerator) -> Self {
        self.session_generator = Some(generator);
        self
    }

    /// Check option values that do not need a backend to validate.
    ///
    /// # Errors
    ///
    /// Returns a configuration error describing the first invalid value.
    pub fn validate(&self) -> Result<()> {
        if self.tcp.host.trim().is_empty() {
            return Err(ContainerError::Configuration(
                "tcp.host must not be empty".to_string(),
            ));
        }
        if self.tcp.host.chars().any(char::is_whitespace) {
            return Err(ContainerError::Configuration(format!(
                "tcp.host '{}' contains whitespace",
                self.tcp.host
            )));
        }

        if let BackendOptions::Docker(docker) = &self.backend {
            if docker.timeout_secs == 0 {
                return Err(ContainerError::Configuration(
                    "backend.timeout_secs must be greater than zero".to_string(),
                ));
            }
            for (server, auth) in &docker.auth {
                if auth.username.is_empty() {
                    return Err(ContainerError::Configuration(format!(
                        "registry credentials for '{}' have no username",
                        server
                    )));
                }
            }
        }

        Ok(())
    }

    /// Load from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the file cannot be read or parsed.
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            ContainerError::Configuration(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
            .map_err(|e| ContainerError::Configuration(format!("{}: {}", path.display(), e)))
    }

    /// Parse from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| ContainerError::Configuration(format!("Invalid relay config: {}", e)))
    }

    /// Save to a TOML file.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if serialization or the write fails.
    pub fn to_toml_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = self.to_toml_string()?;
        fs::write(path.as_ref(), content).map_err(|e| {
            ContainerError::Configuration(format!(
                "Failed to write {}: {}",
                path.as_ref().display(),
                e
            ))
        })
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| ContainerError::Configuration(format!("Failed to serialize config: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = RelayOptions::default();
        assert_eq!(options.tcp.address(), "0.0.0.0:9090");
        assert!(!options.backend.is_fake());
        assert!(options.session_generator.is_none());
        options.validate().unwrap();
    }

    #[test]
    fn test_parse_docker_backend() {
        let options = RelayOptions::from_toml_str(
            r#"
            [tcp]
            host = "relay.internal"
            port = 7000

            [backend]
            kind = "docker"
            organization = "acme"
            socket = "tcp://10.0.0.5:2376"
            cert_path = "/etc/docker/certs"

            [backend.auth."https://index.docker.io/v1/"]
            username = "bot"
            password = "hunter2"
            "#,
        )
        .unwrap();

        assert_eq!(options.tcp.address(), "relay.internal:7000");
        let BackendOptions::Docker(docker) = &options.backend else {
            panic!("expected docker backend");
        };
        assert_eq!(docker.organization.as_deref(), Some("acme"));
        assert_eq!(docker.cert_path, Some(PathBuf::from("/etc/docker/certs")));
        assert_eq!(docker.auth["https://index.docker.io/v1/"].username, "bot");
        assert_eq!(docker.timeout_secs, env::DEFAULT_DOCKER_TIMEOUT_SECS);
    }

    #[test]
    fn test_parse_fake_backend() {
        let options = RelayOptions::from_toml_str("[backend]\nkind = \"fake\"\nexit_code = 2\n").unwrap();
        assert_eq!(options.backend, BackendOptions::Fake { exit_code: 2 });
        assert_eq!(options.tcp, TcpOptions::default());
    }

    #[test]
    fn test_fake_socket_selects_fake_backend() {
        let options = RelayOptions::from_toml_str("[backend]\nkind = \"docker\"\nsocket = \"fake\"\n").unwrap();
        assert!(options.backend.is_fake());
        assert_eq!(
            options.backend.normalized(),
            BackendOptions::Fake { exit_code: 0 }
        );

        let docker = BackendOptions::Docker(DockerOptions {
            socket: "unix:///var/run/docker.sock".to_string(),
            ..Default::default()
        });
        assert!(!docker.is_fake());
        assert_eq!(docker.clone().normalized(), docker);
    }

    #[test]
    fn test_parse_apps() {
        let options = RelayOptions::from_toml_str(
            r#"
            [backend]
            kind = "fake"

            [apps.api]
            PORT = "8080"
            DATABASE_URL = "postgres://db/api"
            "#,
        )
        .unwrap();

        let api = &options.apps["api"];
        assert_eq!(api.get("PORT").map(String::as_str), Some("8080"));
        assert_eq!(api.len(), 2);

        let reloaded = RelayOptions::from_toml_str(&options.to_toml_string().unwrap()).unwrap();
        assert_eq!(reloaded.apps, options.apps);
    }

    #[test]
    fn test_unknown_backend_kind() {
        let err = RelayOptions::from_toml_str("[backend]\nkind = \"kubernetes\"\n").unwrap_err();
        assert!(matches!(err, ContainerError::Configuration(_)));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut options = RelayOptions::fake();
        options.tcp.host = " ".to_string();
        assert!(options.validate().is_err());

        let mut options = RelayOptions::default();
        if let BackendOptions::Docker(docker) = &mut options.backend {
            docker.timeout_secs = 0;
        }
        assert!(options.validate().is_err());
    }

    #[test]
    fn test_toml_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("relay.toml");

        let mut options = RelayOptions::default();
        options.tcp.port = 8123;
        if let BackendOptions::Docker(docker) = &mut options.backend {
            docker.organization = Some("acme".to_string());
        }
        options.to_toml_file(&path).unwrap();

        let loaded = RelayOptions::from_toml_file(&path).unwrap();
        assert_eq!(loaded.tcp.port, 8123);
        assert_eq!(loaded.backend, options.backend);
    }

    #[test]
    fn test_registry_auth_debug_redacts_password() {
        let auth = RegistryAuth {
            username: "bot".to_string(),
            password: "hunter2".to_string(),
            email: None,
        };
        let debug = format!("{:?}", auth);
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("bot"));
    }
}
