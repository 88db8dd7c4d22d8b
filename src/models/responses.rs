//! Response DTOs for the HTTP API
//!
//! Defines the structure of outgoing HTTP response bodies. The rate limit
//! status itself lives in the limit module and serializes directly.

use serde::Serialize;

use crate::token::AD_TOKEN_TTL_SECS;

/// Response body for ad token generation (POST /ad/token)
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdTokenResponse {
    pub success: bool,
    pub ad_token: String,
    /// Seconds until the token expires
    pub expires_in: u64,
}

impl AdTokenResponse {
    pub fn new(ad_token: impl Into<String>) -> Self {
        Self {
            success: true,
            ad_token: ad_token.into(),
            expires_in: AD_TOKEN_TTL_SECS,
        }
    }
}

/// Response body for the ad credit grant (POST /ad/grant)
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdGrantResponse {
    pub success: bool,
    /// Remaining requests after the grant, bonus overlay included
    pub remaining: u32,
    /// Epoch-ms at which the underlying counter window resets
    pub reset_time: u64,
}

impl AdGrantResponse {
    pub fn new(remaining: u32, reset_time: u64) -> Self {
        Self {
            success: true,
            remaining,
            reset_time,
        }
    }
}

/// Response body for TTS token minting (POST /tts/token)
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TtsTokenResponse {
    pub tts_token: String,
    /// Seconds until the token expires
    pub expires_in: u64,
}

impl TtsTokenResponse {
    pub fn new(tts_token: impl Into<String>, expires_in: u64) -> Self {
        Self {
            tts_token: tts_token.into(),
            expires_in,
        }
    }
}

/// Response body for the admin key listing (GET /admin/rate-limits)
#[derive(Debug, Clone, Serialize)]
pub struct AdminKeysResponse {
    pub ip: Vec<String>,
    pub fingerprint: Vec<String>,
    pub user: Vec<String>,
}

/// Response body for the admin reset (DELETE /admin/rate-limits)
#[derive(Debug, Clone, Serialize)]
pub struct AdminResetResponse {
    pub success: bool,
    pub message: String,
}

impl AdminResetResponse {
    pub fn new(removed: bool, target: &str) -> Self {
        Self {
            success: true,
            message: if removed {
                format!("Rate limit record for '{}' reset", target)
            } else {
                format!("No active rate limit record for '{}'", target)
            },
        }
    }
}

/// Response body for the health endpoint (GET /health)
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Health status (e.g., "healthy")
    pub status: String,
    /// Current timestamp in ISO 8601 format
    pub timestamp: String,
}

impl HealthResponse {
    /// Creates a new HealthResponse with current timestamp
    pub fn healthy() -> Self {
        Self {
            status: "healthy".to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}
