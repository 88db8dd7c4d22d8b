//! Rate Limiter Module
//!
//! Per-identity request counters with sliding reset windows and policy
//! selection (anonymous vs authenticated). Counters live in the shared
//! cache as read-then-write records; there is no compare-and-swap, so two
//! concurrent consumes can both observe the same pre-increment count. The
//! under-count is accepted; every write is observed by subsequent reads.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::cache::{current_timestamp_ms, Cache, RATE_LIMIT_PREFIX};
use crate::config::Config;
use crate::error::{AppError, Result};
use crate::limit::CreditService;

// == Identity ==
/// Dimension a request was limited on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LimitMethod {
    Ip,
    Fingerprint,
    User,
}

impl LimitMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            LimitMethod::Ip => "ip",
            LimitMethod::Fingerprint => "fingerprint",
            LimitMethod::User => "user",
        }
    }
}

/// Identity signals extracted from a request.
///
/// IP and fingerprint are independent dimensions; fingerprint-only tracking
/// is the fallback when no usable IP is present.
#[derive(Debug, Clone, Default)]
pub struct CallerIdentity {
    pub user_id: Option<String>,
    pub fingerprint: Option<String>,
    pub ip: Option<String>,
    /// Fingerprint confidence score, passed through for observability
    pub confidence: Option<f64>,
}

/// Hashes an IP address before it is used as a cache-key identity.
pub fn hash_ip(ip: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(ip.as_bytes());
    hex::encode(hasher.finalize())
}

// == Record ==
/// Persisted counter state for one identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitRecord {
    pub count: u32,
    /// Epoch-ms at which the window resets
    pub reset_time: u64,
    /// Epoch-ms of the most recent consumed request
    pub last_seen: u64,
}

// == Status ==
/// Rate limit status produced for the HTTP layer.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitStatus {
    pub allowed: bool,
    pub limit: u32,
    /// Requests left in the window, bonus overlay included. For `consume`
    /// this counts the request just granted, so spending the last slot
    /// reports zero.
    pub remaining: u32,
    pub reset_time: u64,
    pub requires_auth: bool,
    pub is_logged_in: bool,
    pub method: LimitMethod,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

/// Resolved policy for one request.
struct Policy {
    method: LimitMethod,
    identity: String,
    limit: u32,
    window_ms: u64,
    is_logged_in: bool,
}

// == Rate Limit Service ==
#[derive(Clone)]
pub struct RateLimitService {
    cache: Cache,
    credits: CreditService,
    anon_limit: u32,
    anon_window_ms: u64,
    user_limit: u32,
    user_window_ms: u64,
}

impl RateLimitService {
    // == Constructor ==
    pub fn new(cache: Cache, credits: CreditService, config: &Config) -> Self {
        Self {
            cache,
            credits,
            anon_limit: config.anon_limit,
            anon_window_ms: config.anon_window_secs * 1000,
            user_limit: config.user_limit,
            user_window_ms: config.user_window_secs * 1000,
        }
    }

    /// Picks the limiting dimension and policy for the caller.
    ///
    /// Authenticated users are limited per user id; anonymous callers per
    /// hashed IP, falling back to the fingerprint dimension when no IP is
    /// available.
    fn resolve(&self, caller: &CallerIdentity) -> Result<Policy> {
        if let Some(user_id) = &caller.user_id {
            return Ok(Policy {
                method: LimitMethod::User,
                identity: user_id.clone(),
                limit: self.user_limit,
                window_ms: self.user_window_ms,
                is_logged_in: true,
            });
        }
        if let Some(ip) = &caller.ip {
            return Ok(Policy {
                method: LimitMethod::Ip,
                identity: hash_ip(ip),
                limit: self.anon_limit,
                window_ms: self.anon_window_ms,
                is_logged_in: false,
            });
        }
        if let Some(fingerprint) = &caller.fingerprint {
            return Ok(Policy {
                method: LimitMethod::Fingerprint,
                identity: fingerprint.clone(),
                limit: self.anon_limit,
                window_ms: self.anon_window_ms,
                is_logged_in: false,
            });
        }
        Err(AppError::InvalidRequest(
            "No identity available for rate limiting".to_string(),
        ))
    }

    /// Exposes the resolved (method, identity) pair so bonus credits can be
    /// granted to the exact identity the limiter will read them back for.
    pub fn resolve_target(&self, caller: &CallerIdentity) -> Result<(LimitMethod, String)> {
        let policy = self.resolve(caller)?;
        Ok((policy.method, policy.identity))
    }

    fn record_key(method: LimitMethod, identity: &str) -> String {
        format!("{}{}:{}", RATE_LIMIT_PREFIX, method.as_str(), identity)
    }

    /// Loads the record, treating an absent record or an elapsed window as
    /// fresh. A record whose reset time has passed must never deny further
    /// requests; it is reinitialized transparently, without persisting.
    async fn load_fresh(&self, key: &str, window_ms: u64, now: u64) -> RateLimitRecord {
        let stored = match self.cache.get(key).await {
            Ok(value) => value.and_then(|v| serde_json::from_value::<RateLimitRecord>(v).ok()),
            Err(e) => {
                debug!("Rate limit read failed for {}: {}", key, e);
                None
            }
        };

        match stored {
            Some(record) if now < record.reset_time => record,
            _ => RateLimitRecord {
                count: 0,
                reset_time: now + window_ms,
                last_seen: now,
            },
        }
    }

    fn status(
        policy: &Policy,
        record: &RateLimitRecord,
        bonus: u32,
        allowed: bool,
        caller: &CallerIdentity,
    ) -> RateLimitStatus {
        let remaining = policy.limit.saturating_sub(record.count) + bonus;

        RateLimitStatus {
            allowed,
            limit: policy.limit,
            remaining,
            reset_time: record.reset_time,
            requires_auth: !policy.is_logged_in && !allowed,
            is_logged_in: policy.is_logged_in,
            method: policy.method,
            confidence: match policy.method {
                LimitMethod::Fingerprint => caller.confidence,
                _ => None,
            },
        }
    }

    // == Check ==
    /// Read-only rate limit evaluation; persists nothing.
    pub async fn check(&self, caller: &CallerIdentity) -> Result<RateLimitStatus> {
        let policy = self.resolve(caller)?;
        let now = current_timestamp_ms();
        let key = Self::record_key(policy.method, &policy.identity);

        let record = self.load_fresh(&key, policy.window_ms, now).await;
        let bonus = self.credits.bonus_credits(policy.method, &policy.identity).await;

        // Bonus credits raise the effective ceiling until they expire; they
        // are additive and never debited.
        let allowed = record.count < policy.limit + bonus;
        Ok(Self::status(&policy, &record, bonus, allowed, caller))
    }

    // == Consume ==
    /// Evaluates the limit and, when allowed, persists the incremented
    /// counter. The returned status reflects the record after this call, so
    /// the request spending the last slot reports `remaining = 0`.
    ///
    /// A denied attempt leaves the record untouched: persisting it would
    /// push `count` past the ceiling and a bonus credit granted afterwards
    /// could never be spent. An elapsed window yields a fresh record
    /// (count 1), never old+1.
    pub async fn consume(&self, caller: &CallerIdentity) -> Result<RateLimitStatus> {
        let policy = self.resolve(caller)?;
        let now = current_timestamp_ms();
        let key = Self::record_key(policy.method, &policy.identity);

        let mut record = self.load_fresh(&key, policy.window_ms, now).await;
        let bonus = self.credits.bonus_credits(policy.method, &policy.identity).await;

        if record.count >= policy.limit + bonus {
            return Ok(Self::status(&policy, &record, bonus, false, caller));
        }

        record.count += 1;
        record.last_seen = now;
        let ttl = record.reset_time.saturating_sub(now);
        self.cache
            .set(&key, serde_json::to_value(&record).map_err(to_cache_err)?, Some(ttl))
            .await?;

        debug!(
            "Rate limit consume: method={} count={}",
            policy.method.as_str(),
            record.count
        );
        Ok(Self::status(&policy, &record, bonus, true, caller))
    }

    // == Admin Surface ==
    /// Lists active record keys for one dimension.
    pub async fn active_keys(&self, method: LimitMethod) -> Result<Vec<String>> {
        self.cache
            .keys(&format!("{}{}:*", RATE_LIMIT_PREFIX, method.as_str()))
            .await
    }

    /// Resets one identity's record. IP targets are hashed the same way the
    /// limiter hashes them on the request path.
    pub async fn reset(&self, method: LimitMethod, target: &str) -> Result<bool> {
        let identity = match method {
            LimitMethod::Ip => hash_ip(target),
            _ => target.to_string(),
        };
        self.cache.delete(&Self::record_key(method, &identity)).await
    }
}

fn to_cache_err(e: serde_json::Error) -> AppError {
    AppError::Cache(format!("failed to encode rate limit record: {}", e))
}
