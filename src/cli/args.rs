//! Command line argument parsing
//!
//! Subcommands:
//! - `run`: Run one container through the full lifecycle
//! - `ping`: Check connectivity to the container engine
//! - `config`: Print the resolved configuration

use crate::container::Container;
use crate::vars::{ConfigSource, Vars, VarsDelta, VarsError, apply_delta, parse_assignment};
use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Parser)]
#[command(name = "relay")]
#[command(author = "Relay Team")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Run named containers and relay their stdio")]
#[command(long_about = None)]
#[command(arg_required_else_help = true)]
pub struct Args {
    /// Configuration file path
    #[arg(short = 'c', long = "config", global = true)]
    pub config: Option<PathBuf>,

    /// Use the in-memory backend instead of a container engine
    #[arg(long = "fake", global = true)]
    pub fake: bool,

    /// Container engine endpoint (socket path or unix/tcp URL)
    #[arg(long = "socket", value_name = "ENDPOINT", global = true)]
    pub socket: Option<String>,

    /// Enable verbose output
    #[arg(short = 'v', long = "verbose", global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run a container: pull, create, attach, start, wait
    Run(RunArgs),
    /// Check connectivity to the container engine
    Ping,
    /// Print the resolved configuration as TOML
    Config,
}

#[derive(Debug, Clone, ClapArgs)]
pub struct RunArgs {
    /// Image to run
    #[arg(short = 'i', long = "image")]
    pub image: String,

    /// Container name (generated when omitted)
    #[arg(short = 'n', long = "name")]
    pub name: Option<String>,

    /// Command overriding the image default
    #[arg(long = "command")]
    pub command: Option<String>,

    /// Application whose configured environment the container starts from
    #[arg(long = "app", value_name = "NAME")]
    pub app: Option<String>,

    /// Environment variable (can be used multiple times)
    #[arg(short = 'e', long = "env", value_name = "KEY=VALUE", value_parser = parse_assignment)]
    pub env: Vec<(String, String)>,

    /// Drop a variable inherited from the application (can be used multiple times)
    #[arg(long = "unset", value_name = "KEY")]
    pub unset: Vec<String>,

    /// Bridge this process's stdin/stdout to the container
    #[arg(short = 'a', long = "attach")]
    pub attach: bool,

    /// Give up after this many seconds
    #[arg(short = 't', long = "timeout", value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Keep the container after it exits
    #[arg(long = "keep")]
    pub keep: bool,
}

impl RunArgs {
    /// Changes requested with `--env` and `--unset`; `--env` wins on conflicts.
    pub fn env_delta(&self) -> VarsDelta {
        let mut delta: VarsDelta = self.unset.iter().map(|key| (key.clone(), None)).collect();
        for (key, value) in &self.env {
            delta.insert(key.clone(), Some(value.clone()));
        }
        delta
    }

    /// Resolve the container environment.
    ///
    /// With `--app` the delta is applied to that application's variables in
    /// `source`; the application must exist. Without it the delta is applied
    /// to an empty set.
    pub async fn resolve_env(&self, source: &dyn ConfigSource) -> Result<Vars, VarsError> {
        let delta = self.env_delta();
        match &self.app {
            Some(app) => {
                source.current(app).await?;
                source.apply(app, &delta).await
            }
            None => Ok(apply_delta(Vars::new(), &delta)),
        }
    }

    /// Build the container this invocation describes.
    pub fn to_container(&self, env: Vars) -> Container {
        let name = self
            .name
            .clone()
            .unwrap_or_else(|| generated_name(&uuid::Uuid::new_v4().to_string()));

        Container::new(&self.image, name)
            .with_command(self.command.clone().unwrap_or_default())
            .with_env(env)
            .with_attach(self.attach)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout.map(Duration::from_secs)
    }
}

/// Container name derived from a session-style identifier.
pub fn generated_name(id: &str) -> String {
    let short = id.get(..12).unwrap_or(id);
    format!("relay-{}", short)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vars::MemoryConfigSource;

    #[test]
    fn test_parse_run() {
        let args = Args::try_parse_from([
            "relay", "--fake", "run", "--image", "busybox", "--name", "job-1", "-e", "A=1", "-e",
            "B=x=y", "--attach", "--timeout", "30",
        ])
        .unwrap();

        assert!(args.fake);
        let Commands::Run(run) = args.command else {
            panic!("expected run");
        };
        let container = run.to_container(apply_delta(Vars::new(), &run.env_delta()));
        assert_eq!(container.image, "busybox");
        assert_eq!(container.name, "job-1");
        assert!(container.attach);
        assert_eq!(container.env.get("B").map(String::as_str), Some("x=y"));
        assert_eq!(container.env_list(), vec!["A=1", "B=x=y"]);
        assert_eq!(run.timeout(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_invalid_env_rejected() {
        let result = Args::try_parse_from(["relay", "run", "--image", "busybox", "-e", "NOPE"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let args =
            Args::try_parse_from(["relay", "ping", "--socket", "unix:///tmp/docker.sock"]).unwrap();
        assert!(matches!(args.command, Commands::Ping));
        assert_eq!(args.socket.as_deref(), Some("unix:///tmp/docker.sock"));
    }

    #[test]
    fn test_generated_name() {
        let run = Args::try_parse_from(["relay", "run", "--image", "busybox"]).unwrap();
        let Commands::Run(run) = run.command else {
            panic!("expected run");
        };
        let container = run.to_container(Vars::new());
        assert!(container.name.starts_with("relay-"));
        assert_eq!(container.name.len(), "relay-".len() + 12);
        assert_eq!(generated_name("abc"), "relay-abc");
    }

    fn run_args(argv: &[&str]) -> RunArgs {
        let args = Args::try_parse_from(argv).unwrap();
        let Commands::Run(run) = args.command else {
            panic!("expected run");
        };
        run
    }

    #[tokio::test]
    async fn test_resolve_env_from_app() {
        let source = MemoryConfigSource::from_apps([(
            "api".to_string(),
            [("PORT", "80"), ("DEBUG", "1"), ("TOKEN", "abc")]
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )]);
        let run = run_args(&[
            "relay", "run", "--image", "busybox", "--app", "api", "-e", "PORT=8080", "--unset",
            "DEBUG",
        ]);

        let env = run.resolve_env(&source).await.unwrap();
        let container = run.to_container(env);
        assert_eq!(container.env_list(), vec!["PORT=8080", "TOKEN=abc"]);
        assert_eq!(source.current("api").await.unwrap(), container.env);
    }

    #[tokio::test]
    async fn test_resolve_env_unknown_app() {
        let source = MemoryConfigSource::new();
        let run = run_args(&["relay", "run", "--image", "busybox", "--app", "web"]);
        assert_eq!(
            run.resolve_env(&source).await,
            Err(VarsError::AppNotFound("web".to_string()))
        );
    }

    #[tokio::test]
    async fn test_resolve_env_without_app() {
        let source = MemoryConfigSource::new();
        let run = run_args(&["relay", "run", "--image", "busybox", "-e", "A=1", "--unset", "A"]);
        let env = run.resolve_env(&source).await.unwrap();
        assert_eq!(env.get("A").map(String::as_str), Some("1"));
    }
}
