//! Cache Module
//!
//! Provides the uniform cache adapter contract implemented by the in-memory,
//! filesystem and tiered backends, plus the thin facade used by the rate
//! limiter and token services.

mod entry;
mod filesystem;
mod memory;
mod tiered;


// Re-export public types
pub use entry::{current_timestamp_ms, CacheEntry};
pub use filesystem::FilesystemAdapter;
pub use memory::MemoryAdapter;
pub use tiered::TieredCache;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;

// == Key Prefixes ==
/// Prefix for rate-limit counter records
pub const RATE_LIMIT_PREFIX: &str = "rate_limit:";

/// Prefix for bonus-credit overlays
pub const BONUS_CREDITS_PREFIX: &str = "bonus_credits:";

/// Prefix for hourly/daily ad-watch counters
pub const AD_LIMIT_PREFIX: &str = "ad_limit:";

/// Prefix for ad-completion token bookkeeping
pub const AD_TOKEN_PREFIX: &str = "ad_token:";

/// Prefix for one-shot TTS token records
pub const TTS_TOKEN_PREFIX: &str = "tts_token:";

// == Cache Adapter Trait ==
/// Uniform contract implemented by every cache backend.
///
/// Adapters lazily delete expired entries on read: a `get` past the entry's
/// expiration behaves as absent, and `keys` excludes expired entries. No
/// background sweep is guaranteed at this layer.
#[async_trait]
pub trait CacheAdapter: Send + Sync {
    /// Stores a value with an optional TTL in milliseconds.
    async fn set(&self, key: &str, value: Value, ttl_ms: Option<u64>) -> Result<()>;

    /// Retrieves a value, or None if absent or expired.
    async fn get(&self, key: &str) -> Result<Option<Value>>;

    /// Removes a key, returning whether an entry was present.
    async fn delete(&self, key: &str) -> Result<bool>;

    /// Removes all entries.
    async fn flush(&self) -> Result<()>;

    /// Lists keys matching a glob-style pattern (`*` any run, `?` one char;
    /// empty or `*` matches all).
    async fn keys(&self, pattern: &str) -> Result<Vec<String>>;
}

// == Cache Facade ==
/// Thin facade delegating to a single adapter.
#[derive(Clone)]
pub struct Cache {
    adapter: Arc<dyn CacheAdapter>,
}

impl Cache {
    /// Creates a new facade over the given adapter.
    pub fn new(adapter: Arc<dyn CacheAdapter>) -> Self {
        Self { adapter }
    }

    pub async fn set(&self, key: &str, value: Value, ttl_ms: Option<u64>) -> Result<()> {
        self.adapter.set(key, value, ttl_ms).await
    }

    pub async fn get(&self, key: &str) -> Result<Option<Value>> {
        self.adapter.get(key).await
    }

    pub async fn delete(&self, key: &str) -> Result<bool> {
        self.adapter.delete(key).await
    }

    pub async fn flush(&self) -> Result<()> {
        self.adapter.flush().await
    }

    pub async fn keys(&self, pattern: &str) -> Result<Vec<String>> {
        self.adapter.keys(pattern).await
    }

    /// Derived existence check.
    ///
    /// Implemented strictly as `keys(key)` being non-empty, so the key is
    /// treated as a pattern: a key containing glob-special characters can
    /// match unrelated entries. Known quirk, kept deliberately.
    pub async fn has(&self, key: &str) -> Result<bool> {
        Ok(!self.adapter.keys(key).await?.is_empty())
    }
}

// == Pattern Matching ==
/// Matches a key against a glob-style pattern.
///
/// Supports `*` (any run of characters, including empty) and `?` (exactly one
/// character). An empty pattern or `*` matches everything.
pub fn pattern_matches(pattern: &str, key: &str) -> bool {
    if pattern.is_empty() || pattern == "*" {
        return true;
    }

    let p: Vec<char> = pattern.chars().collect();
    let k: Vec<char> = key.chars().collect();

    // Two-pointer glob match with backtracking over the last `*`
    let (mut pi, mut ki) = (0usize, 0usize);
    let mut star: Option<(usize, usize)> = None;

    while ki < k.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == k[ki]) {
            pi += 1;
            ki += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star = Some((pi, ki));
            pi += 1;
        } else if let Some((star_pi, star_ki)) = star {
            pi = star_pi + 1;
            ki = star_ki + 1;
            star = Some((star_pi, star_ki + 1));
        } else {
            return false;
        }
    }

    while pi < p.len() && p[pi] == '*' {
        pi += 1;
    }

    pi == p.len()
}
