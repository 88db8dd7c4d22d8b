//! Credits Module
//!
//! Bonus-credit overlays granted by rewarded-ad completions, plus the
//! hourly/daily ad-watch quotas that gate how often a caller can earn them.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::cache::{current_timestamp_ms, Cache, AD_LIMIT_PREFIX, BONUS_CREDITS_PREFIX};
use crate::config::Config;
use crate::error::{AppError, Result};
use crate::limit::LimitMethod;

/// Bonus credits live for 24 hours from the last grant.
pub const BONUS_CREDIT_TTL_MS: u64 = 24 * 60 * 60 * 1000;

const HOURLY_WINDOW_MS: u64 = 60 * 60 * 1000;
const DAILY_WINDOW_MS: u64 = 24 * 60 * 60 * 1000;

// == Ad Watch Counter ==
/// Windowed counter shared by the hourly and daily quotas.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct WatchCounter {
    count: u32,
    /// Epoch-ms at which the window resets
    reset_time: u64,
}

/// Snapshot of both ad-watch quotas for one identity.
#[derive(Debug, Clone)]
pub struct AdQuota {
    pub allowed: bool,
    pub hourly_count: u32,
    pub hourly_limit: u32,
    pub daily_count: u32,
    pub daily_limit: u32,
}

// == Credit Service ==
#[derive(Clone)]
pub struct CreditService {
    cache: Cache,
    hourly_limit: u32,
    daily_limit: u32,
}

impl CreditService {
    // == Constructor ==
    pub fn new(cache: Cache, config: &Config) -> Self {
        Self {
            cache,
            hourly_limit: config.hourly_ad_limit,
            daily_limit: config.daily_ad_limit,
        }
    }

    /// Bonus keys are scoped `user` for authenticated identities and `ip`
    /// for everything anonymous.
    fn bonus_key(method: LimitMethod, identity: &str) -> String {
        let scope = match method {
            LimitMethod::User => "user",
            LimitMethod::Ip | LimitMethod::Fingerprint => "ip",
        };
        format!("{}{}:{}", BONUS_CREDITS_PREFIX, scope, identity)
    }

    fn watch_key(method: LimitMethod, window: &str, identity: &str) -> String {
        format!("{}{}:{}:{}", AD_LIMIT_PREFIX, method.as_str(), window, identity)
    }

    // == Bonus Credits ==
    /// Current bonus overlay for an identity.
    ///
    /// Fails open to zero: a cache outage must not block chat entirely, it
    /// only loses the overlay.
    pub async fn bonus_credits(&self, method: LimitMethod, identity: &str) -> u32 {
        let key = Self::bonus_key(method, identity);
        match self.cache.get(&key).await {
            Ok(value) => value.and_then(|v| v.as_u64()).unwrap_or(0) as u32,
            Err(e) => {
                warn!("Bonus credit read failed for {}: {}", key, e);
                0
            }
        }
    }

    /// Adds credits to the identity's overlay, refreshing the 24h TTL.
    ///
    /// Credits are additive and never debited on use; they raise the visible
    /// ceiling until they expire. Read-then-write, same race caveat as the
    /// rate limit counters.
    pub async fn grant_bonus(&self, method: LimitMethod, identity: &str, amount: u32) -> Result<u32> {
        let key = Self::bonus_key(method, identity);
        let current = self.bonus_credits(method, identity).await;
        let total = current + amount;

        self.cache
            .set(&key, serde_json::json!(total), Some(BONUS_CREDIT_TTL_MS))
            .await?;
        debug!("Granted {} bonus credit(s) to {} (total {})", amount, key, total);
        Ok(total)
    }

    // == Ad Watch Quotas ==
    async fn load_counter(&self, key: &str, window_ms: u64, now: u64) -> WatchCounter {
        let stored = match self.cache.get(key).await {
            Ok(value) => value.and_then(|v| serde_json::from_value::<WatchCounter>(v).ok()),
            Err(e) => {
                warn!("Ad counter read failed for {}: {}", key, e);
                None
            }
        };

        match stored {
            Some(counter) if now < counter.reset_time => counter,
            _ => WatchCounter {
                count: 0,
                reset_time: now + window_ms,
            },
        }
    }

    /// Whether the identity may watch another rewarded ad.
    ///
    /// A grant is blocked once either the hourly or the daily counter is at
    /// its ceiling.
    pub async fn can_watch_ad(&self, method: LimitMethod, identity: &str) -> AdQuota {
        let now = current_timestamp_ms();
        let hourly = self
            .load_counter(&Self::watch_key(method, "hourly", identity), HOURLY_WINDOW_MS, now)
            .await;
        let daily = self
            .load_counter(&Self::watch_key(method, "daily", identity), DAILY_WINDOW_MS, now)
            .await;

        AdQuota {
            allowed: hourly.count < self.hourly_limit && daily.count < self.daily_limit,
            hourly_count: hourly.count,
            hourly_limit: self.hourly_limit,
            daily_count: daily.count,
            daily_limit: self.daily_limit,
        }
    }

    /// Records a completed ad watch against both windows.
    pub async fn record_ad_watch(&self, method: LimitMethod, identity: &str) -> Result<()> {
        let now = current_timestamp_ms();
        for (window, window_ms) in [("hourly", HOURLY_WINDOW_MS), ("daily", DAILY_WINDOW_MS)] {
            let key = Self::watch_key(method, window, identity);
            let mut counter = self.load_counter(&key, window_ms, now).await;
            counter.count += 1;
            let ttl = counter.reset_time.saturating_sub(now);
            self.cache
                .set(
                    &key,
                    serde_json::to_value(&counter)
                        .map_err(|e| AppError::Cache(format!("failed to encode ad counter: {}", e)))?,
                    Some(ttl),
                )
                .await?;
        }
        Ok(())
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryAdapter;
    use std::sync::Arc;

    fn service() -> (Cache, CreditService) {
        let cache = Cache::new(Arc::new(MemoryAdapter::new(86_400)));
        let service = CreditService::new(cache.clone(), &Config::default());
        (cache, service)
    }

    #[tokio::test]
    async fn test_bonus_defaults_to_zero() {
        let (_cache, service) = service();
        assert_eq!(service.bonus_credits(LimitMethod::Ip, "id1").await, 0);
    }

    #[tokio::test]
    async fn test_grant_accumulates() {
        let (_cache, service) = service();

        assert_eq!(service.grant_bonus(LimitMethod::Ip, "id1", 1).await.unwrap(), 1);
        assert_eq!(service.grant_bonus(LimitMethod::Ip, "id1", 2).await.unwrap(), 3);
        assert_eq!(service.bonus_credits(LimitMethod::Ip, "id1").await, 3);
    }

    #[tokio::test]
    async fn test_bonus_scopes_user_vs_ip() {
        let (cache, service) = service();

        service.grant_bonus(LimitMethod::User, "u1", 1).await.unwrap();
        service.grant_bonus(LimitMethod::Fingerprint, "fp1", 1).await.unwrap();

        assert!(cache.has("bonus_credits:user:u1").await.unwrap());
        // Fingerprint identities share the anonymous "ip" scope
        assert!(cache.has("bonus_credits:ip:fp1").await.unwrap());
    }

    #[tokio::test]
    async fn test_ad_quota_fresh_identity_allowed() {
        let (_cache, service) = service();

        let quota = service.can_watch_ad(LimitMethod::Fingerprint, "fp1").await;
        assert!(quota.allowed);
        assert_eq!(quota.hourly_count, 0);
        assert_eq!(quota.daily_count, 0);
    }

    #[tokio::test]
    async fn test_hourly_ceiling_blocks_grant() {
        let (_cache, service) = service();

        // Default ceiling: 3 per hour
        for _ in 0..3 {
            assert!(service.can_watch_ad(LimitMethod::Fingerprint, "fp1").await.allowed);
            service.record_ad_watch(LimitMethod::Fingerprint, "fp1").await.unwrap();
        }

        let quota = service.can_watch_ad(LimitMethod::Fingerprint, "fp1").await;
        assert!(!quota.allowed);
        assert_eq!(quota.hourly_count, 3);
    }

    #[tokio::test]
    async fn test_daily_ceiling_blocks_independently() {
        let (cache, service) = service();

        // Exhaust only the daily counter; hourly stays fresh
        let now = current_timestamp_ms();
        let counter = WatchCounter {
            count: 10,
            reset_time: now + DAILY_WINDOW_MS,
        };
        cache
            .set(
                "ad_limit:fingerprint:daily:fp1",
                serde_json::to_value(&counter).unwrap(),
                Some(DAILY_WINDOW_MS),
            )
            .await
            .unwrap();

        let quota = service.can_watch_ad(LimitMethod::Fingerprint, "fp1").await;
        assert!(!quota.allowed);
        assert_eq!(quota.hourly_count, 0);
        assert_eq!(quota.daily_count, 10);
    }

    #[tokio::test]
    async fn test_elapsed_watch_window_resets() {
        let (cache, service) = service();

        let now = current_timestamp_ms();
        let stale = WatchCounter {
            count: 3,
            reset_time: now - 1,
        };
        cache
            .set(
                "ad_limit:fingerprint:hourly:fp1",
                serde_json::to_value(&stale).unwrap(),
                Some(HOURLY_WINDOW_MS),
            )
            .await
            .unwrap();

        let quota = service.can_watch_ad(LimitMethod::Fingerprint, "fp1").await;
        assert!(quota.allowed);
        assert_eq!(quota.hourly_count, 0);
    }
}
