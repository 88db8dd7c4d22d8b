//! Configuration Module
//!
//! Handles loading and managing server configuration from environment variables.

use std::env;

/// Server configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP server port
    pub server_port: u16,
    /// Base directory for the durable filesystem cache layer
    pub cache_dir: String,
    /// Default TTL in seconds for memory-layer entries without explicit TTL
    pub memory_default_ttl: u64,
    /// Background cleanup task interval in seconds
    pub cleanup_interval: u64,
    /// Request ceiling for anonymous (IP / fingerprint) identities
    pub anon_limit: u32,
    /// Counter window in seconds for anonymous identities
    pub anon_window_secs: u64,
    /// Daily request ceiling for authenticated users
    pub user_limit: u32,
    /// Counter window in seconds for authenticated users
    pub user_window_secs: u64,
    /// Maximum rewarded-ad watches per hour
    pub hourly_ad_limit: u32,
    /// Maximum rewarded-ad watches per day
    pub daily_ad_limit: u32,
    /// Whether the rewarded-ad subsystem is active at all
    pub ad_rewards_enabled: bool,
    /// HS256 signing secret for ad-completion tokens
    ///
    /// Read from `AD_TOKEN_SECRET`, falling back to `AUTH_SECRET`. Required
    /// only when `ad_rewards_enabled` is true.
    pub ad_token_secret: Option<String>,
    /// Bearer token protecting the admin endpoints
    pub admin_token: Option<String>,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `SERVER_PORT` - HTTP server port (default: 3000)
    /// - `CACHE_DIR` - Durable cache directory (default: ./cache-data)
    /// - `MEMORY_DEFAULT_TTL` - Memory-layer default TTL in seconds (default: 300)
    /// - `CLEANUP_INTERVAL` - Cleanup frequency in seconds (default: 60)
    /// - `ANON_LIMIT` / `ANON_WINDOW_SECS` - Anonymous ceiling and window (default: 3 / 86400)
    /// - `USER_LIMIT` / `USER_WINDOW_SECS` - Authenticated ceiling and window (default: 10 / 86400)
    /// - `HOURLY_AD_LIMIT` / `DAILY_AD_LIMIT` - Ad-watch ceilings (default: 3 / 10)
    /// - `AD_REWARDS_ENABLED` - "1" or "true" to enable the rewards subsystem (default: off)
    /// - `AD_TOKEN_SECRET` (fallback `AUTH_SECRET`) - Token signing secret
    /// - `ADMIN_TOKEN` - Bearer token for the admin endpoints
    pub fn from_env() -> Self {
        Self {
            server_port: env::var("SERVER_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3000),
            cache_dir: env::var("CACHE_DIR").unwrap_or_else(|_| "./cache-data".to_string()),
            memory_default_ttl: env::var("MEMORY_DEFAULT_TTL")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(300),
            cleanup_interval: env::var("CLEANUP_INTERVAL")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(60),
            anon_limit: env::var("ANON_LIMIT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3),
            anon_window_secs: env::var("ANON_WINDOW_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(86_400),
            user_limit: env::var("USER_LIMIT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(10),
            user_window_secs: env::var("USER_WINDOW_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(86_400),
            hourly_ad_limit: env::var("HOURLY_AD_LIMIT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3),
            daily_ad_limit: env::var("DAILY_AD_LIMIT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(10),
            ad_rewards_enabled: env::var("AD_REWARDS_ENABLED")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
            ad_token_secret: env::var("AD_TOKEN_SECRET")
                .or_else(|_| env::var("AUTH_SECRET"))
                .ok(),
            admin_token: env::var("ADMIN_TOKEN").ok(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_port: 3000,
            cache_dir: "./cache-data".to_string(),
            memory_default_ttl: 300,
            cleanup_interval: 60,
            anon_limit: 3,
            anon_window_secs: 86_400,
            user_limit: 10,
            user_window_secs: 86_400,
            hourly_ad_limit: 3,
            daily_ad_limit: 10,
            ad_rewards_enabled: false,
            ad_token_secret: None,
            admin_token: None,
        }
    }
}
