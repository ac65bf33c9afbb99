//! The container unit of work.

use crate::vars::Vars;
use serde::{Deserialize, Serialize};

/// A container to run.
///
/// Built by the caller before any relay call. The serde shape (`image`,
/// `name`, `command`, `state`, `env`, `attach`, `attach_url`) is the contract
/// exposed to transport layers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Container {
    /// Image reference to pull
    pub image: String,
    /// Backend name; unique among concurrently active containers
    pub name: String,
    /// Override command (image default when empty)
    #[serde(default)]
    pub command: String,
    /// Last observed lifecycle state, set by the caller
    #[serde(default)]
    pub state: String,
    /// Environment injected into the container
    #[serde(default)]
    pub env: Vars,
    /// Whether stdio should be bridged
    #[serde(default)]
    pub attach: bool,
    /// Rendezvous address for the container's stream
    #[serde(default)]
    pub attach_url: String,
}

impl Container {
    pub fn new(image: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = command.into();
        self
    }

    /// Replace the whole environment.
    pub fn with_env(mut self, env: Vars) -> Self {
        self.env = env;
        self
    }

    pub fn with_var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn with_attach(mut self, attach: bool) -> Self {
        self.attach = attach;
        self
    }

    pub fn with_attach_url(mut self, url: impl Into<String>) -> Self {
        self.attach_url = url.into();
        self
    }

    /// Environment as `KEY=VALUE` entries, sorted by key.
    pub fn env_list(&self) -> Vec<String> {
        self.env.iter().map(|(k, v)| format!("{}={}", k, v)).collect()
    }

    /// Command split into arguments, `None` to keep the image default.
    pub fn command_args(&self) -> Option<Vec<String>> {
        let args: Vec<String> = self.command.split_whitespace().map(String::from).collect();
        if args.is_empty() { None } else { Some(args) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_shape() {
        let container = Container::new("busybox", "job-1")
            .with_command("echo hi")
            .with_var("FOO", "bar")
            .with_attach(true)
            .with_attach_url("rendezvous://relay:9090/abc");

        let value = serde_json::to_value(&container).unwrap();
        assert_eq!(
            value,
            json!({
                "image": "busybox",
                "name": "job-1",
                "command": "echo hi",
                "state": "",
                "env": {"FOO": "bar"},
                "attach": true,
                "attach_url": "rendezvous://relay:9090/abc",
            })
        );
    }

    #[test]
    fn test_deserialize_with_missing_optionals() {
        let container: Container =
            serde_json::from_str(r#"{"image": "busybox", "name": "job-1"}"#).unwrap();
        assert_eq!(container, Container::new("busybox", "job-1"));
        assert!(!container.attach);
        assert!(container.env.is_empty());
    }

    #[test]
    fn test_env_list_is_sorted() {
        let container = Container::new("busybox", "job-1")
            .with_var("ZED", "1")
            .with_var("ALPHA", "2");
        assert_eq!(container.env_list(), vec!["ALPHA=2", "ZED=1"]);
    }

    #[test]
    fn test_command_args() {
        assert_eq!(Container::new("busybox", "a").command_args(), None);
        assert_eq!(
            Container::new("busybox", "a")
                .with_command("  sh -c  date ")
                .command_args(),
            Some(vec!["sh".to_string(), "-c".to_string(), "date".to_string()])
        );
    }
}
