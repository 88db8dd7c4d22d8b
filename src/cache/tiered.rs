//! Tiered Cache Module
//!
//! Dual-layer composite combining a fast in-memory layer with a durable
//! filesystem layer behind the same adapter contract. Favors availability
//! over strict consistency: an outage in one layer must not stop rate
//! limiting or chat from functioning.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::warn;

use crate::cache::{CacheAdapter, RATE_LIMIT_PREFIX};
use crate::error::{AppError, Result};

/// Minimum TTL applied when promoting rate-limit counters into the fast
/// layer (4 hours). Without the floor, a counter meant to persist for a day
/// would silently shorten to the fast layer's default window after promotion.
pub const PROMOTION_FLOOR_MS: u64 = 4 * 60 * 60 * 1000;

// == Tiered Cache ==
/// Decorator over two adapters implementing `CacheAdapter` itself, so it can
/// be nested or swapped transparently.
pub struct TieredCache {
    fast: Arc<dyn CacheAdapter>,
    durable: Arc<dyn CacheAdapter>,
    /// Promotion TTL in milliseconds for non-rate-limit keys
    fast_default_ttl_ms: u64,
}

impl TieredCache {
    // == Constructor ==
    pub fn new(
        fast: Arc<dyn CacheAdapter>,
        durable: Arc<dyn CacheAdapter>,
        fast_default_ttl_ms: u64,
    ) -> Self {
        Self {
            fast,
            durable,
            fast_default_ttl_ms,
        }
    }

    /// TTL policy for values promoted from the durable layer.
    ///
    /// Rate-limit keys get at least the 4-hour floor; everything else gets
    /// the fast layer's default window.
    fn promotion_ttl_ms(&self, key: &str) -> u64 {
        if key.starts_with(RATE_LIMIT_PREFIX) {
            self.fast_default_ttl_ms.max(PROMOTION_FLOOR_MS)
        } else {
            self.fast_default_ttl_ms
        }
    }
}

#[async_trait]
impl CacheAdapter for TieredCache {
    /// Writes to both layers concurrently; succeeds if at least one layer
    /// succeeds, errors only when both fail (messages aggregated).
    async fn set(&self, key: &str, value: Value, ttl_ms: Option<u64>) -> Result<()> {
        let (fast_res, durable_res) = tokio::join!(
            self.fast.set(key, value.clone(), ttl_ms),
            self.durable.set(key, value, ttl_ms),
        );

        match (fast_res, durable_res) {
            (Err(fast_err), Err(durable_err)) => Err(AppError::Cache(format!(
                "both cache layers failed on set: fast: {}; durable: {}",
                fast_err, durable_err
            ))),
            (Err(e), Ok(())) => {
                warn!("Fast layer set failed for {}: {}", key, e);
                Ok(())
            }
            (Ok(()), Err(e)) => {
                warn!("Durable layer set failed for {}: {}", key, e);
                Ok(())
            }
            (Ok(()), Ok(())) => Ok(()),
        }
    }

    /// Fast layer first; on miss falls back to the durable layer, promoting
    /// durable hits back into the fast layer. Promotion failures are
    /// swallowed, the durable value is still returned.
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        match self.fast.get(key).await {
            Ok(Some(value)) => return Ok(Some(value)),
            Ok(None) => {}
            Err(e) => warn!("Fast layer get failed for {}: {}", key, e),
        }

        let value = self.durable.get(key).await?;

        if let Some(ref value) = value {
            let ttl = self.promotion_ttl_ms(key);
            if let Err(e) = self.fast.set(key, value.clone(), Some(ttl)).await {
                warn!("Promotion to fast layer failed for {}: {}", key, e);
            }
        }

        Ok(value)
    }

    /// Best-effort on both layers; reports success if either deleted.
    async fn delete(&self, key: &str) -> Result<bool> {
        let (fast_res, durable_res) = tokio::join!(self.fast.delete(key), self.durable.delete(key));
        Ok(fast_res.unwrap_or(false) || durable_res.unwrap_or(false))
    }

    /// Fans out to both layers; errors only when both fail.
    async fn flush(&self) -> Result<()> {
        let (fast_res, durable_res) = tokio::join!(self.fast.flush(), self.durable.flush());

        match (fast_res, durable_res) {
            (Err(fast_err), Err(durable_err)) => Err(AppError::Cache(format!(
                "both cache layers failed on flush: fast: {}; durable: {}",
                fast_err, durable_err
            ))),
            _ => Ok(()),
        }
    }

    /// Unions and deduplicates keys across both layers; a single-layer
    /// failure is tolerated.
    async fn keys(&self, pattern: &str) -> Result<Vec<String>> {
        let (fast_res, durable_res) =
            tokio::join!(self.fast.keys(pattern), self.durable.keys(pattern));

        let mut keys = match fast_res {
            Ok(keys) => keys,
            Err(e) => {
                warn!("Fast layer keys failed for {}: {}", pattern, e);
                Vec::new()
            }
        };
        match durable_res {
            Ok(durable_keys) => {
                for key in durable_keys {
                    if !keys.contains(&key) {
                        keys.push(key);
                    }
                }
            }
            Err(e) => warn!("Durable layer keys failed for {}: {}", pattern, e),
        }
        Ok(keys)
    }
}
