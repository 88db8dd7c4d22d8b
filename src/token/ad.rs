//! Ad Token Module
//!
//! Short-lived HS256-signed tokens binding a device fingerprint to a
//! one-time ad-completion claim. Replay protection is a `used` marker in
//! the shared cache; the signature alone suffices for stateless validity,
//! the cache entries exist for replay bookkeeping and lookup.

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::warn;

use crate::cache::{Cache, AD_TOKEN_PREFIX};
use crate::config::Config;
use crate::error::{AppError, Result};

/// Ad tokens expire five minutes after minting.
pub const AD_TOKEN_TTL_SECS: u64 = 300;

/// Replay fences and blacklist entries outlive the token by a day.
const MARKER_TTL_MS: u64 = 24 * 60 * 60 * 1000;

const TOKEN_TYPE: &str = "ad_completion";

// == Claims ==
/// Signed JWT payload of an ad-completion token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdTokenClaims {
    #[serde(rename = "type")]
    pub token_type: String,
    pub fingerprint: String,
    pub nonce: String,
    pub iat: u64,
    pub exp: u64,
    pub jti: String,
}

// == Validation Outcome ==
/// Result of validating an ad token; a sentinel value, never an error, so
/// nothing leaks past the validation boundary.
#[derive(Debug, Clone)]
pub struct AdTokenValidation {
    pub valid: bool,
    pub reason: Option<String>,
    pub claims: Option<AdTokenClaims>,
}

impl AdTokenValidation {
    fn rejected(reason: &str) -> Self {
        Self {
            valid: false,
            reason: Some(reason.to_string()),
            claims: None,
        }
    }

    fn accepted(claims: AdTokenClaims) -> Self {
        Self {
            valid: true,
            reason: None,
            claims: Some(claims),
        }
    }
}

// == Ad Token Service ==
#[derive(Clone)]
pub struct AdTokenService {
    cache: Cache,
    enabled: bool,
    secret: Option<String>,
}

impl AdTokenService {
    // == Constructor ==
    /// Fails fast when the rewards feature is enabled without a signing
    /// secret, rather than silently issuing unverifiable tokens.
    pub fn new(cache: Cache, config: &Config) -> Result<Self> {
        if config.ad_rewards_enabled && config.ad_token_secret.is_none() {
            return Err(AppError::Config(
                "AD_TOKEN_SECRET (or AUTH_SECRET) is required when ad rewards are enabled"
                    .to_string(),
            ));
        }
        Ok(Self {
            cache,
            enabled: config.ad_rewards_enabled,
            secret: config.ad_token_secret.clone(),
        })
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    fn valid_key(jti: &str) -> String {
        format!("{}valid:{}", AD_TOKEN_PREFIX, jti)
    }

    fn used_key(jti: &str) -> String {
        format!("{}used:{}", AD_TOKEN_PREFIX, jti)
    }

    fn blacklist_key(jti: &str) -> String {
        format!("{}blacklist:{}", AD_TOKEN_PREFIX, jti)
    }

    fn secret(&self) -> Result<&str> {
        self.secret
            .as_deref()
            .ok_or_else(|| AppError::Config("ad token signing secret not configured".to_string()))
    }

    fn random_hex() -> String {
        let bytes: [u8; 16] = rand::rng().random();
        hex::encode(bytes)
    }

    // == Generate ==
    /// Mints a signed token bound to the given fingerprint.
    ///
    /// The cache write backing replay lookup is best-effort: minting still
    /// succeeds when the store step fails, since the signature alone allows
    /// stateless validation.
    pub async fn generate(&self, fingerprint: &str) -> Result<String> {
        if !self.enabled {
            return Err(AppError::FeatureDisabled(
                "Ad rewards are not enabled".to_string(),
            ));
        }
        let secret = self.secret()?;

        let iat = chrono::Utc::now().timestamp() as u64;
        let claims = AdTokenClaims {
            token_type: TOKEN_TYPE.to_string(),
            fingerprint: fingerprint.to_string(),
            nonce: Self::random_hex(),
            iat,
            exp: iat + AD_TOKEN_TTL_SECS,
            jti: Self::random_hex(),
        };

        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .map_err(|e| AppError::Internal(format!("failed to sign ad token: {}", e)))?;

        if let Err(e) = self
            .cache
            .set(
                &Self::valid_key(&claims.jti),
                json!(fingerprint),
                Some(AD_TOKEN_TTL_SECS * 1000),
            )
            .await
        {
            warn!("Ad token cache store failed for jti {}: {}", claims.jti, e);
        }

        Ok(token)
    }

    // == Validate ==
    /// Verifies and consumes a token: signature and algorithm, type,
    /// expiry, fingerprint binding, replay fence, then the stored valid
    /// entry. On full success the token is marked used and the valid entry
    /// removed, so a second validation is rejected.
    pub async fn validate(&self, token: &str, expected_fingerprint: &str) -> AdTokenValidation {
        if !self.enabled {
            return AdTokenValidation::rejected("Ad rewards are not enabled");
        }
        let Ok(secret) = self.secret() else {
            return AdTokenValidation::rejected("Token validation failed");
        };

        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        let claims = match decode::<AdTokenClaims>(
            token,
            &DecodingKey::from_secret(secret.as_bytes()),
            &validation,
        ) {
            Ok(data) => data.claims,
            Err(e) => {
                return match e.kind() {
                    jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                        AdTokenValidation::rejected("Token expired")
                    }
                    _ => AdTokenValidation::rejected("Invalid token"),
                };
            }
        };

        if claims.token_type != TOKEN_TYPE {
            return AdTokenValidation::rejected("Invalid token type");
        }
        if claims.fingerprint != expected_fingerprint {
            return AdTokenValidation::rejected("Fingerprint mismatch");
        }

        // Replay fence
        match self.cache.get(&Self::used_key(&claims.jti)).await {
            Ok(Some(_)) => return AdTokenValidation::rejected("Token already used"),
            Ok(None) => {}
            Err(e) => {
                warn!("Replay fence read failed for jti {}: {}", claims.jti, e);
                return AdTokenValidation::rejected("Token validation failed");
            }
        }

        // Explicit revocation channel; fails open on cache errors
        if self.is_blacklisted(&claims.jti).await {
            return AdTokenValidation::rejected("Token revoked");
        }

        // Stored valid entry must exist and carry the same fingerprint
        match self.cache.get(&Self::valid_key(&claims.jti)).await {
            Ok(Some(stored)) => {
                if stored.as_str() != Some(expected_fingerprint) {
                    return AdTokenValidation::rejected("Fingerprint mismatch");
                }
            }
            Ok(None) => return AdTokenValidation::rejected("Token not found"),
            Err(e) => {
                warn!("Valid entry read failed for jti {}: {}", claims.jti, e);
                return AdTokenValidation::rejected("Token validation failed");
            }
        }

        // Consume: write the used marker, then drop the valid entry
        if let Err(e) = self
            .cache
            .set(&Self::used_key(&claims.jti), json!("used"), Some(MARKER_TTL_MS))
            .await
        {
            warn!("Replay fence write failed for jti {}: {}", claims.jti, e);
            return AdTokenValidation::rejected("Token validation failed");
        }
        if let Err(e) = self.cache.delete(&Self::valid_key(&claims.jti)).await {
            warn!("Valid entry delete failed for jti {}: {}", claims.jti, e);
        }

        AdTokenValidation::accepted(claims)
    }

    // == Blacklist ==
    /// Explicitly revokes a token id for 24 hours.
    pub async fn revoke(&self, jti: &str) -> Result<()> {
        self.cache
            .set(&Self::blacklist_key(jti), json!("revoked"), Some(MARKER_TTL_MS))
            .await
    }

    /// Blacklist membership check.
    ///
    /// Fails open: a cache read error returns false, prioritizing
    /// availability of valid tokens over strict denial.
    pub async fn is_blacklisted(&self, jti: &str) -> bool {
        match self.cache.get(&Self::blacklist_key(jti)).await {
            Ok(entry) => entry.is_some(),
            Err(e) => {
                warn!("Blacklist read failed for jti {}: {}", jti, e);
                false
            }
        }
    }
}
