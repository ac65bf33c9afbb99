//! Environment variable sets and deltas.
//!
//! The relay never stores application configuration itself. Callers fetch an
//! application's current variables from a [`ConfigSource`], apply a delta, and
//! copy the merged set into [`Container::env`](crate::container::Container)
//! before creating the container.

use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::BTreeMap;
use tracing::debug;

/// An environment variable set, ordered by key.
pub type Vars = BTreeMap<String, String>;

/// A change to a [`Vars`] set: `Some` sets a value, `None` unsets it.
pub type VarsDelta = BTreeMap<String, Option<String>>;

/// Errors from configuration sources and variable parsing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VarsError {
    /// Assignment was not of the form `KEY=VALUE`
    #[error("Invalid variable assignment '{0}': expected KEY=VALUE")]
    InvalidAssignment(String),

    /// Application has no configuration
    #[error("Application not found: {0}")]
    AppNotFound(String),
}

/// Apply `delta` to `vars` and return the merged set.
pub fn apply_delta(mut vars: Vars, delta: &VarsDelta) -> Vars {
    for (key, value) in delta {
        match value {
            Some(value) => {
                vars.insert(key.clone(), value.clone());
            }
            None => {
                vars.remove(key);
            }
        }
    }
    vars
}

/// Parse a `KEY=VALUE` assignment. The value may be empty or contain `=`.
pub fn parse_assignment(input: &str) -> Result<(String, String), VarsError> {
    match input.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(VarsError::InvalidAssignment(input.to_string())),
    }
}

/// Where an application's environment lives.
#[async_trait]
pub trait ConfigSource: Send + Sync {
    /// Current variables for `app`.
    async fn current(&self, app: &str) -> Result<Vars, VarsError>;

    /// Apply `delta` to `app` and return the merged set.
    async fn apply(&self, app: &str, delta: &VarsDelta) -> Result<Vars, VarsError>;
}

/// In-memory [`ConfigSource`].
///
/// Applying a delta to an unknown application creates it.
#[derive(Debug, Default)]
pub struct MemoryConfigSource {
    apps: DashMap<String, Vars>,
}

impl MemoryConfigSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// A source seeded with the given applications.
    pub fn from_apps(apps: impl IntoIterator<Item = (String, Vars)>) -> Self {
        Self {
            apps: apps.into_iter().collect(),
        }
    }

    /// Replace the variables of `app`.
    pub fn insert(&self, app: impl Into<String>, vars: Vars) {
        self.apps.insert(app.into(), vars);
    }
}

#[async_trait]
impl ConfigSource for MemoryConfigSource {
    async fn current(&self, app: &str) -> Result<Vars, VarsError> {
        self.apps
            .get(app)
            .map(|vars| vars.clone())
            .ok_or_else(|| VarsError::AppNotFound(app.to_string()))
    }

    async fn apply(&self, app: &str, delta: &VarsDelta) -> Result<Vars, VarsError> {
        let mut entry = self.apps.entry(app.to_string()).or_default();
        let merged = apply_delta(std::mem::take(entry.value_mut()), delta);
        *entry.value_mut() = merged.clone();
        debug!("Applied {} config changes to {}", delta.len(), app);
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> Vars {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_apply_delta_sets_and_unsets() {
        let base = vars(&[("A", "1"), ("B", "2")]);
        let mut delta = VarsDelta::new();
        delta.insert("B".to_string(), None);
        delta.insert("C".to_string(), Some("3".to_string()));
        delta.insert("A".to_string(), Some("10".to_string()));

        assert_eq!(apply_delta(base, &delta), vars(&[("A", "10"), ("C", "3")]));
    }

    #[test]
    fn test_unset_missing_key_is_noop() {
        let mut delta = VarsDelta::new();
        delta.insert("MISSING".to_string(), None);
        assert_eq!(apply_delta(vars(&[("A", "1")]), &delta), vars(&[("A", "1")]));
    }

    #[test]
    fn test_parse_assignment() {
        assert_eq!(
            parse_assignment("URL=postgres://u:p@h/db?x=1").unwrap(),
            ("URL".to_string(), "postgres://u:p@h/db?x=1".to_string())
        );
        assert_eq!(
            parse_assignment("EMPTY=").unwrap(),
            ("EMPTY".to_string(), String::new())
        );
        assert!(parse_assignment("NOVALUE").is_err());
        assert!(parse_assignment("=value").is_err());
    }

    #[tokio::test]
    async fn test_memory_source() {
        let source = MemoryConfigSource::new();
        assert_eq!(
            source.current("api").await,
            Err(VarsError::AppNotFound("api".to_string()))
        );

        source.insert("api", vars(&[("PORT", "80")]));
        let mut delta = VarsDelta::new();
        delta.insert("DEBUG".to_string(), Some("1".to_string()));

        let merged = source.apply("api", &delta).await.unwrap();
        assert_eq!(merged, vars(&[("DEBUG", "1"), ("PORT", "80")]));
        assert_eq!(source.current("api").await.unwrap(), merged);
    }

    #[tokio::test]
    async fn test_from_apps() {
        let source = MemoryConfigSource::from_apps([("api".to_string(), vars(&[("A", "1")]))]);
        assert_eq!(source.current("api").await.unwrap(), vars(&[("A", "1")]));
        assert!(source.current("web").await.is_err());
    }

    #[tokio::test]
    async fn test_apply_creates_unknown_app() {
        let source = MemoryConfigSource::new();
        let mut delta = VarsDelta::new();
        delta.insert("A".to_string(), Some("1".to_string()));
        assert_eq!(source.apply("new", &delta).await.unwrap(), vars(&[("A", "1")]));
    }
}
