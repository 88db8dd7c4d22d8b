//! Rate Limit Module
//!
//! Multi-dimensional rate limiting (IP, fingerprint, authenticated user)
//! with bonus-credit overlays and rewarded-ad watch quotas, all backed by
//! the shared cache.

mod credits;
mod limiter;

pub use credits::{AdQuota, CreditService, BONUS_CREDIT_TTL_MS};
pub use limiter::{
    hash_ip, CallerIdentity, LimitMethod, RateLimitRecord, RateLimitService, RateLimitStatus,
};
