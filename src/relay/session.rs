//! Session identifiers and the session registry.

use crate::container::Container;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Produces new session identifiers.
///
/// Must be safe to call concurrently and return values that are unique with
/// overwhelming probability. The default generator returns random UUIDs.
#[derive(Clone)]
pub struct SessionGenerator(Arc<dyn Fn() -> String + Send + Sync>);

impl SessionGenerator {
    pub fn new<F>(generate: F) -> Self
    where
        F: Fn() -> String + Send + Sync + 'static,
    {
        Self(Arc::new(generate))
    }

    /// Generate a new identifier.
    pub fn generate(&self) -> String {
        (self.0)()
    }
}

impl Default for SessionGenerator {
    fn default() -> Self {
        Self::new(|| Uuid::new_v4().to_string())
    }
}

impl std::fmt::Debug for SessionGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SessionGenerator")
    }
}

/// Maps session identifiers to the container each session runs.
///
/// A single lock covers the map and is held only for the map operation
/// itself; callers never see the lock.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<String, Container>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite the container for `id`, returning the previous one.
    pub async fn set(&self, id: impl Into<String>, container: Container) -> Option<Container> {
        self.sessions.lock().await.insert(id.into(), container)
    }

    /// Insert `container` under `id` only if `id` is free.
    ///
    /// Returns the container back when `id` is already taken.
    pub async fn insert_new(&self, id: String, container: Container) -> Result<(), Container> {
        let mut sessions = self.sessions.lock().await;
        if sessions.contains_key(&id) {
            return Err(container);
        }
        sessions.insert(id, container);
        Ok(())
    }

    /// The container registered for `id`.
    pub async fn get(&self, id: &str) -> Option<Container> {
        self.sessions.lock().await.get(id).cloned()
    }

    /// Update the caller-observed state of the container for `id`.
    ///
    /// Returns `false` if no such session exists.
    pub async fn set_state(&self, id: &str, state: impl Into<String>) -> bool {
        match self.sessions.lock().await.get_mut(id) {
            Some(container) => {
                container.state = state.into();
                true
            }
            None => false,
        }
    }

    /// Drop the entry for `id`.
    pub async fn remove(&self, id: &str) -> Option<Container> {
        self.sessions.lock().await.remove(id)
    }

    pub async fn contains(&self, id: &str) -> bool {
        self.sessions.lock().await.contains_key(id)
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.lock().await.is_empty()
    }

    /// All session identifiers, sorted.
    pub async fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.sessions.lock().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Copy of every entry.
    pub async fn snapshot(&self) -> HashMap<String, Container> {
        self.sessions.lock().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_generator_produces_uuids() {
        let generator = SessionGenerator::default();
        let id = generator.generate();
        assert!(Uuid::parse_str(&id).is_ok());
        assert_ne!(id, generator.generate());
    }

    #[test]
    fn test_custom_generator() {
        let counter = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let generator = {
            let counter = counter.clone();
            SessionGenerator::new(move || {
                format!(
                    "s-{}",
                    counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst)
                )
            })
        };
        assert_eq!(generator.generate(), "s-0");
        assert_eq!(generator.clone().generate(), "s-1");
    }

    #[tokio::test]
    async fn test_set_overwrites() {
        let registry = SessionRegistry::new();
        assert!(registry.set("a", Container::new("busybox", "one")).await.is_none());

        let previous = registry.set("a", Container::new("busybox", "two")).await;
        assert_eq!(previous.unwrap().name, "one");
        assert_eq!(registry.get("a").await.unwrap().name, "two");
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_insert_new_refuses_taken_id() {
        let registry = SessionRegistry::new();
        registry
            .insert_new("a".to_string(), Container::new("busybox", "one"))
            .await
            .unwrap();

        let rejected = registry
            .insert_new("a".to_string(), Container::new("busybox", "two"))
            .await
            .unwrap_err();
        assert_eq!(rejected.name, "two");
        assert_eq!(registry.get("a").await.unwrap().name, "one");
    }

    #[tokio::test]
    async fn test_state_update_and_remove() {
        let registry = SessionRegistry::new();
        registry.set("a", Container::new("busybox", "one")).await;

        assert!(registry.set_state("a", "running").await);
        assert!(!registry.set_state("missing", "running").await);
        assert_eq!(registry.get("a").await.unwrap().state, "running");

        assert!(registry.remove("a").await.is_some());
        assert!(registry.is_empty().await);
        assert!(!registry.contains("a").await);
    }

    #[tokio::test]
    async fn test_ids_sorted() {
        let registry = SessionRegistry::new();
        for id in ["c", "a", "b"] {
            registry.set(id, Container::new("busybox", id)).await;
        }
        assert_eq!(registry.ids().await, vec!["a", "b", "c"]);
        assert_eq!(registry.snapshot().await.len(), 3);
    }
}
