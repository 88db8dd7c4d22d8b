//! Memory Adapter Module
//!
//! Fast in-memory cache backend bounded by process lifetime.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::cache::{pattern_matches, CacheAdapter, CacheEntry};
use crate::error::Result;

// == Memory Adapter ==
/// In-memory cache backend: a HashMap behind an async RwLock.
///
/// Entries without an explicit TTL get the configured default. Expired
/// entries are deleted lazily on read; `cleanup_expired` offers an explicit
/// sweep for the background task.
pub struct MemoryAdapter {
    entries: RwLock<HashMap<String, CacheEntry>>,
    /// Default TTL in seconds for entries without explicit TTL
    default_ttl: u64,
}

impl MemoryAdapter {
    // == Constructor ==
    /// Creates a new MemoryAdapter.
    ///
    /// # Arguments
    /// * `default_ttl` - Default TTL in seconds for entries without explicit TTL
    pub fn new(default_ttl: u64) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            default_ttl,
        }
    }

    /// Default TTL of this layer in milliseconds.
    pub fn default_ttl_ms(&self) -> u64 {
        self.default_ttl * 1000
    }

    // == Cleanup Expired ==
    /// Removes all expired entries.
    ///
    /// Returns the number of entries removed.
    pub async fn cleanup_expired(&self) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired());
        before - entries.len()
    }

    /// Returns the current number of entries (expired included until swept).
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Returns true if the cache is empty.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl CacheAdapter for MemoryAdapter {
    async fn set(&self, key: &str, value: Value, ttl_ms: Option<u64>) -> Result<()> {
        let effective_ttl = ttl_ms.unwrap_or(self.default_ttl_ms());
        let entry = CacheEntry::new(value, Some(effective_ttl));

        let mut entries = self.entries.write().await;
        entries.insert(key.to_string(), entry);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Value>> {
        // Fast path: read lock, clone if live
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                None => return Ok(None),
                Some(entry) if !entry.is_expired() => return Ok(Some(entry.value.clone())),
                Some(_) => {}
            }
        }

        // Expired: upgrade to a write lock and delete lazily
        let mut entries = self.entries.write().await;
        if entries.get(key).is_some_and(|e| e.is_expired()) {
            entries.remove(key);
        }
        Ok(None)
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let mut entries = self.entries.write().await;
        Ok(entries.remove(key).is_some())
    }

    async fn flush(&self) -> Result<()> {
        let mut entries = self.entries.write().await;
        entries.clear();
        Ok(())
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>> {
        let entries = self.entries.read().await;
        let keys = entries
            .iter()
            .filter(|(_, entry)| !entry.is_expired())
            .filter(|(key, _)| pattern_matches(pattern, key))
            .map(|(key, _)| key.clone())
            .collect();
        Ok(keys)
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_set_and_get() {
        let adapter = MemoryAdapter::new(300);

        adapter.set("key1", json!("value1"), None).await.unwrap();
        let value = adapter.get("key1").await.unwrap();

        assert_eq!(value, Some(json!("value1")));
    }

    #[tokio::test]
    async fn test_get_nonexistent() {
        let adapter = MemoryAdapter::new(300);
        assert_eq!(adapter.get("nope").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_delete() {
        let adapter = MemoryAdapter::new(300);

        adapter.set("key1", json!("value1"), None).await.unwrap();
        assert!(adapter.delete("key1").await.unwrap());
        assert!(!adapter.delete("key1").await.unwrap());
        assert_eq!(adapter.get("key1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_overwrite() {
        let adapter = MemoryAdapter::new(300);

        adapter.set("key1", json!("v1"), None).await.unwrap();
        adapter.set("key1", json!("v2"), None).await.unwrap();

        assert_eq!(adapter.get("key1").await.unwrap(), Some(json!("v2")));
        assert_eq!(adapter.len().await, 1);
    }

    #[tokio::test]
    async fn test_lazy_expiry_on_get() {
        let adapter = MemoryAdapter::new(300);

        // 1 ms TTL expires immediately for practical purposes
        adapter.set("gone", json!("v"), Some(1)).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        assert_eq!(adapter.get("gone").await.unwrap(), None);
        // Lazy delete removed the entry itself
        assert!(adapter.is_empty().await);
    }

    #[tokio::test]
    async fn test_keys_excludes_expired() {
        let adapter = MemoryAdapter::new(300);

        adapter.set("live", json!("v"), Some(60_000)).await.unwrap();
        adapter.set("dead", json!("v"), Some(1)).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        let keys = adapter.keys("*").await.unwrap();
        assert_eq!(keys, vec!["live".to_string()]);
    }

    #[tokio::test]
    async fn test_keys_pattern_filter() {
        let adapter = MemoryAdapter::new(300);

        adapter.set("rate_limit:ip:a", json!(1), None).await.unwrap();
        adapter.set("rate_limit:user:u", json!(1), None).await.unwrap();
        adapter.set("tts_token:t1", json!(1), None).await.unwrap();

        let mut keys = adapter.keys("rate_limit:*").await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["rate_limit:ip:a", "rate_limit:user:u"]);
    }

    #[tokio::test]
    async fn test_flush() {
        let adapter = MemoryAdapter::new(300);

        adapter.set("a", json!(1), None).await.unwrap();
        adapter.set("b", json!(2), None).await.unwrap();
        adapter.flush().await.unwrap();

        assert!(adapter.is_empty().await);
    }

    #[tokio::test]
    async fn test_cleanup_expired() {
        let adapter = MemoryAdapter::new(300);

        adapter.set("short", json!("v"), Some(1)).await.unwrap();
        adapter.set("long", json!("v"), Some(60_000)).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        let removed = adapter.cleanup_expired().await;
        assert_eq!(removed, 1);
        assert_eq!(adapter.len().await, 1);
    }
}
