//! Filesystem Adapter Module
//!
//! Durable cache backend storing one JSON file per key. Survives process
//! restarts, which is what lets rate-limit counters outlive a redeploy.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tokio::fs;
use tracing::warn;

use crate::cache::{pattern_matches, CacheEntry};
use crate::cache::CacheAdapter;
use crate::error::{AppError, Result};

// == Stored Record ==
/// On-disk representation of an entry.
///
/// Cache keys contain `:` and other characters that are not filename-safe,
/// so the file is named by the SHA-256 of the key and the original key is
/// kept inside the record for `keys(pattern)` scans.
#[derive(Debug, Serialize, Deserialize)]
struct StoredRecord {
    key: String,
    #[serde(flatten)]
    entry: CacheEntry,
}

// == Filesystem Adapter ==
/// Filesystem-backed cache adapter.
///
/// Writes are plain overwrites (no rename-on-write); a crash mid-write can
/// leave a truncated file, which subsequent reads treat as absent.
pub struct FilesystemAdapter {
    base_dir: PathBuf,
}

impl FilesystemAdapter {
    // == Constructor ==
    /// Creates the adapter, creating the base directory if needed.
    pub async fn new(base_dir: impl AsRef<Path>) -> Result<Self> {
        let base_dir = base_dir.as_ref().to_path_buf();
        fs::create_dir_all(&base_dir)
            .await
            .map_err(|e| AppError::Cache(format!("failed to create cache dir: {}", e)))?;
        Ok(Self { base_dir })
    }

    fn file_path(&self, key: &str) -> PathBuf {
        let mut hasher = Sha256::new();
        hasher.update(key.as_bytes());
        let name = hex::encode(hasher.finalize());
        self.base_dir.join(format!("{}.json", name))
    }

    async fn read_record(&self, path: &Path) -> Option<StoredRecord> {
        let bytes = fs::read(path).await.ok()?;
        match serde_json::from_slice(&bytes) {
            Ok(record) => Some(record),
            Err(e) => {
                // Truncated or corrupt file: treat as absent and drop it
                warn!("Discarding unreadable cache file {:?}: {}", path, e);
                let _ = fs::remove_file(path).await;
                None
            }
        }
    }

    // == Cleanup Expired ==
    /// Removes all expired entry files.
    ///
    /// Returns the number of files removed.
    pub async fn cleanup_expired(&self) -> usize {
        let mut removed = 0;
        let Ok(mut dir) = fs::read_dir(&self.base_dir).await else {
            return 0;
        };
        while let Ok(Some(item)) = dir.next_entry().await {
            let path = item.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(record) = self.read_record(&path).await {
                if record.entry.is_expired() && fs::remove_file(&path).await.is_ok() {
                    removed += 1;
                }
            }
        }
        removed
    }
}

#[async_trait]
impl CacheAdapter for FilesystemAdapter {
    async fn set(&self, key: &str, value: Value, ttl_ms: Option<u64>) -> Result<()> {
        let record = StoredRecord {
            key: key.to_string(),
            entry: CacheEntry::new(value, ttl_ms),
        };
        let bytes = serde_json::to_vec(&record)
            .map_err(|e| AppError::Cache(format!("failed to encode cache record: {}", e)))?;
        fs::write(self.file_path(key), bytes)
            .await
            .map_err(|e| AppError::Cache(format!("failed to write cache file: {}", e)))?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Value>> {
        let path = self.file_path(key);
        let Some(record) = self.read_record(&path).await else {
            return Ok(None);
        };

        if record.entry.is_expired() {
            // Lazy expiry: unlink on read
            let _ = fs::remove_file(&path).await;
            return Ok(None);
        }

        Ok(Some(record.entry.value))
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        match fs::remove_file(self.file_path(key)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(AppError::Cache(format!("failed to delete cache file: {}", e))),
        }
    }

    async fn flush(&self) -> Result<()> {
        let mut dir = fs::read_dir(&self.base_dir)
            .await
            .map_err(|e| AppError::Cache(format!("failed to list cache dir: {}", e)))?;
        while let Ok(Some(item)) = dir.next_entry().await {
            let path = item.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                let _ = fs::remove_file(path).await;
            }
        }
        Ok(())
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut dir = fs::read_dir(&self.base_dir)
            .await
            .map_err(|e| AppError::Cache(format!("failed to list cache dir: {}", e)))?;
        while let Ok(Some(item)) = dir.next_entry().await {
            let path = item.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(record) = self.read_record(&path).await {
                if !record.entry.is_expired() && pattern_matches(pattern, &record.key) {
                    keys.push(record.key);
                }
            }
        }
        Ok(keys)
    }
}
