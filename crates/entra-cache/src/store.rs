use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::error::{CacheError, Result};

/// Key-value capability set a cache backing store must satisfy.
///
/// Values are serialized JSON records; the store treats them as opaque
/// strings. Implementations may be in-memory, on disk, or an OS secret
/// store, as long as they provide these four operations.
#[async_trait::async_trait]
pub trait CacheStorage: Send + Sync {
    /// Read the raw value stored under `key`.
    async fn get(&self, key: &str) -> Option<String>;

    /// Write `value` under `key`, replacing any previous value.
    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Delete `key`. Deleting an absent key is a silent no-op.
    async fn remove(&self, key: &str) -> Result<()>;

    /// Enumerate all stored keys.
    async fn keys(&self) -> Vec<String>;
}

/// In-memory storage for testing and single-process use
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    entries: Arc<RwLock<HashMap<String, String>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

#[async_trait::async_trait]
impl CacheStorage for MemoryStorage {
    async fn get(&self, key: &str) -> Option<String> {
        self.entries.read().ok()?.get(key).cloned()
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries
            .write()
            .map_err(|_| CacheError::Poisoned)?
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.entries
            .write()
            .map_err(|_| CacheError::Poisoned)?
            .remove(key);
        Ok(())
    }

    async fn keys(&self) -> Vec<String> {
        self.entries
            .read()
            .ok()
            .map(|entries| entries.keys().cloned().collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_get_remove() {
        let store = MemoryStorage::new();

        store.set("k1", "v1").await.unwrap();
        assert_eq!(store.get("k1").await.as_deref(), Some("v1"));

        store.set("k1", "v2").await.unwrap();
        assert_eq!(store.get("k1").await.as_deref(), Some("v2"));

        store.remove("k1").await.unwrap();
        assert_eq!(store.get("k1").await, None);
    }

    #[tokio::test]
    async fn test_remove_missing_key_is_noop() {
        let store = MemoryStorage::new();
        store.remove("absent").await.unwrap();
    }

    #[tokio::test]
    async fn test_keys_enumerates_everything() {
        let store = MemoryStorage::new();
        store.set("a", "1").await.unwrap();
        store.set("b", "2").await.unwrap();

        let mut keys = store.keys().await;
        keys.sort();
        assert_eq!(keys, vec!["a", "b"]);
    }
}
