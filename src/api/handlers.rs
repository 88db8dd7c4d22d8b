//! API Handlers
//!
//! HTTP request handlers for each endpoint. All abuse-prevention state
//! lives behind the shared cache; handlers translate between HTTP and the
//! services, normalizing every failure into the JSON error envelope.

use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use tracing::warn;

use crate::cache::Cache;
use crate::config::Config;
use crate::error::{AppError, Result};
use crate::limit::{CallerIdentity, CreditService, LimitMethod, RateLimitService, RateLimitStatus};
use crate::models::{
    AdGrantRequest, AdGrantResponse, AdTokenRequest, AdTokenResponse, AdminKeysResponse,
    AdminResetRequest, AdminResetResponse, ChatRequest, HealthResponse, TtsRequest,
    TtsTokenRequest, TtsTokenResponse,
};
use crate::token::{
    AdTokenService, StubSynthesizer, Synthesizer, TtsConsumeOutcome, TtsTokenService,
    TTS_TOKEN_TTL_MS,
};

const DEFAULT_VOICE: &str = "nova";
const DEFAULT_FORMAT: &str = "mp3";

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub limiter: RateLimitService,
    pub credits: CreditService,
    pub ad_tokens: AdTokenService,
    pub tts_tokens: TtsTokenService,
    pub synthesizer: Arc<dyn Synthesizer>,
    admin_token: Option<String>,
}

impl AppState {
    /// Wires all services over one shared cache.
    pub fn new(cache: Cache, config: &Config, synthesizer: Arc<dyn Synthesizer>) -> Result<Self> {
        let credits = CreditService::new(cache.clone(), config);
        Ok(Self {
            limiter: RateLimitService::new(cache.clone(), credits.clone(), config),
            credits,
            ad_tokens: AdTokenService::new(cache.clone(), config)?,
            tts_tokens: TtsTokenService::new(cache),
            synthesizer,
            admin_token: config.admin_token.clone(),
        })
    }

    /// Convenience constructor with the built-in stub synthesizer.
    pub fn with_stub_synthesizer(cache: Cache, config: &Config) -> Result<Self> {
        Self::new(cache, config, Arc::new(StubSynthesizer))
    }

    fn require_admin(&self, headers: &HeaderMap) -> Result<()> {
        let Some(expected) = &self.admin_token else {
            return Err(AppError::Unauthorized(
                "Admin access is not configured".to_string(),
            ));
        };
        let supplied = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "));
        if supplied != Some(expected.as_str()) {
            return Err(AppError::Unauthorized(
                "Missing or invalid admin token".to_string(),
            ));
        }
        Ok(())
    }
}

// == Identity Extraction ==
/// Builds the caller identity from request headers.
///
/// The client IP comes from the first `x-forwarded-for` element; the
/// fingerprint and user id from dedicated headers set by the upstream
/// session layer (sessions themselves are outside this core).
fn caller_identity(headers: &HeaderMap) -> CallerIdentity {
    let header_str = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(String::from)
    };

    CallerIdentity {
        user_id: header_str("x-user-id"),
        fingerprint: header_str("x-fingerprint"),
        ip: headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(String::from),
        confidence: header_str("x-fingerprint-confidence").and_then(|v| v.parse().ok()),
    }
}

// == Chat Gate ==
/// Handler for POST /chat
///
/// Consumes one request from the caller's rate limit. Denial is a normal
/// terminal state, reported as 429 with the full status so the client can
/// differentiate "log in to continue" from "daily limit reached".
pub async fn chat_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<ChatRequest>,
) -> Result<Response> {
    if let Some(error_msg) = req.validate() {
        return Err(AppError::InvalidRequest(error_msg));
    }

    let caller = caller_identity(&headers);
    let status = state.limiter.consume(&caller).await?;

    Ok(rate_limit_response(status))
}

/// Handler for GET /rate-limit
///
/// Read-only status check; never increments counters.
pub async fn rate_limit_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<RateLimitStatus>> {
    let caller = caller_identity(&headers);
    let status = state.limiter.check(&caller).await?;
    Ok(Json(status))
}

fn rate_limit_response(status: RateLimitStatus) -> Response {
    if status.allowed {
        Json(status).into_response()
    } else {
        (StatusCode::TOO_MANY_REQUESTS, Json(status)).into_response()
    }
}

// == Ad Rewards ==
/// Handler for POST /ad/token
///
/// Mints a signed ad-completion token bound to the supplied fingerprint.
pub async fn ad_token_handler(
    State(state): State<AppState>,
    Json(req): Json<AdTokenRequest>,
) -> Result<Json<AdTokenResponse>> {
    if let Some(error_msg) = req.validate() {
        return Err(AppError::InvalidRequest(error_msg));
    }

    let token = state.ad_tokens.generate(&req.fingerprint).await?;
    Ok(Json(AdTokenResponse::new(token)))
}

/// Handler for POST /ad/grant
///
/// Redeems a completed-ad token: validates and consumes it, enforces the
/// hourly/daily watch quotas, then grants one bonus credit to the same
/// identity the rate limiter tracks for this caller.
pub async fn ad_grant_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<AdGrantRequest>,
) -> Result<Json<AdGrantResponse>> {
    if let Some(error_msg) = req.validate() {
        return Err(AppError::InvalidRequest(error_msg));
    }
    if !state.ad_tokens.enabled() {
        return Err(AppError::FeatureDisabled(
            "Ad rewards are not enabled".to_string(),
        ));
    }

    // Ad quotas are tracked on the fingerprint the token is bound to
    let quota = state
        .credits
        .can_watch_ad(LimitMethod::Fingerprint, &req.fingerprint)
        .await;
    if !quota.allowed {
        return Err(AppError::LimitExceeded(
            "Ad watch limit reached, try again later".to_string(),
        ));
    }

    let validation = state.ad_tokens.validate(&req.ad_token, &req.fingerprint).await;
    if !validation.valid {
        let reason = validation
            .reason
            .unwrap_or_else(|| "Invalid ad token".to_string());
        return Err(AppError::InvalidRequest(reason));
    }

    state
        .credits
        .record_ad_watch(LimitMethod::Fingerprint, &req.fingerprint)
        .await?;

    // The bonus must land on the identity the limiter reads it back for
    let mut caller = caller_identity(&headers);
    if caller.fingerprint.is_none() {
        caller.fingerprint = Some(req.fingerprint.clone());
    }
    let (method, identity) = state.limiter.resolve_target(&caller)?;
    state.credits.grant_bonus(method, &identity, 1).await?;

    let status = state.limiter.check(&caller).await?;
    Ok(Json(AdGrantResponse::new(status.remaining, status.reset_time)))
}

// == TTS ==
/// Handler for POST /tts/token
///
/// Trusted-flow endpoint minting a one-shot token bound to exact text.
pub async fn tts_token_handler(
    State(state): State<AppState>,
    Json(req): Json<TtsTokenRequest>,
) -> Result<Json<TtsTokenResponse>> {
    if let Some(error_msg) = req.validate() {
        return Err(AppError::InvalidRequest(error_msg));
    }

    let token = TtsTokenService::generate_token();
    state
        .tts_tokens
        .store(&token, &req.text, req.character_id, req.session_id)
        .await?;

    Ok(Json(TtsTokenResponse::new(token, TTS_TOKEN_TTL_MS / 1000)))
}

/// Handler for POST /tts
///
/// Consumes a TTS token and returns raw audio bytes. The first consumption
/// generates audio and caches it on the token record; replays serve the
/// identical cached bytes with `X-Cache: HIT`.
pub async fn tts_handler(
    State(state): State<AppState>,
    Json(req): Json<TtsRequest>,
) -> Result<Response> {
    if let Some(error_msg) = req.validate() {
        return Err(AppError::InvalidRequest(error_msg));
    }

    match state.tts_tokens.validate_and_consume(&req.tts_token).await? {
        TtsConsumeOutcome::Invalid { reason } => Err(AppError::InvalidRequest(reason)),
        TtsConsumeOutcome::Replay {
            audio,
            format,
            voice,
            model,
        } => Ok(audio_response(audio, &format, &voice, &model, true)),
        TtsConsumeOutcome::FirstUse { text, .. } => {
            let voice = req.voice.as_deref().unwrap_or(DEFAULT_VOICE);
            let format = req.format.as_deref().unwrap_or(DEFAULT_FORMAT);

            let audio = state
                .synthesizer
                .synthesize(&text, voice, format, req.instructions.as_deref())
                .await?;

            // Best effort: losing the cached copy only costs a regeneration
            // guard, not the response
            if let Err(e) = state
                .tts_tokens
                .cache_audio(&req.tts_token, &audio, format, voice, state.synthesizer.model())
                .await
            {
                warn!("Failed to cache audio for {}: {}", req.tts_token, e);
            }

            Ok(audio_response(audio, format, voice, state.synthesizer.model(), false))
        }
    }
}

fn audio_response(audio: Vec<u8>, format: &str, voice: &str, model: &str, hit: bool) -> Response {
    (
        [
            (header::CONTENT_TYPE.as_str(), format!("audio/{}", format)),
            ("x-cache", if hit { "HIT" } else { "MISS" }.to_string()),
            ("x-tts-voice", voice.to_string()),
            ("x-tts-model", model.to_string()),
        ],
        audio,
    )
        .into_response()
}

// == Admin ==
/// Handler for GET /admin/rate-limits
///
/// Lists active record keys per dimension. Requires the admin bearer token.
pub async fn admin_list_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<AdminKeysResponse>> {
    state.require_admin(&headers)?;

    Ok(Json(AdminKeysResponse {
        ip: state.limiter.active_keys(LimitMethod::Ip).await?,
        fingerprint: state.limiter.active_keys(LimitMethod::Fingerprint).await?,
        user: state.limiter.active_keys(LimitMethod::User).await?,
    }))
}

/// Handler for DELETE /admin/rate-limits
///
/// Resets one identity's record in the named dimension.
pub async fn admin_reset_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<AdminResetRequest>,
) -> Result<Json<AdminResetResponse>> {
    state.require_admin(&headers)?;

    let method = match req.target_type.as_str() {
        "ip" => LimitMethod::Ip,
        "fingerprint" => LimitMethod::Fingerprint,
        "user" => LimitMethod::User,
        other => {
            return Err(AppError::InvalidRequest(format!(
                "Unknown rate limit type: {}",
                other
            )))
        }
    };

    let removed = state.limiter.reset(method, &req.target).await?;
    Ok(Json(AdminResetResponse::new(removed, &req.target)))
}

// == Health ==
/// Handler for GET /health
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::healthy())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryAdapter;

    fn test_state() -> AppState {
        let cache = Cache::new(Arc::new(MemoryAdapter::new(86_400)));
        let config = Config {
            ad_rewards_enabled: true,
            ad_token_secret: Some("test-secret".to_string()),
            admin_token: Some("admin-secret".to_string()),
            ..Default::default()
        };
        AppState::with_stub_synthesizer(cache, &config).unwrap()
    }

    fn anon_headers(ip: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", ip.parse().unwrap());
        headers
    }

    #[test]
    fn test_caller_identity_extraction() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "203.0.113.9, 10.0.0.1".parse().unwrap());
        headers.insert("x-fingerprint", "fp1".parse().unwrap());
        headers.insert("x-fingerprint-confidence", "0.9".parse().unwrap());

        let caller = caller_identity(&headers);
        assert_eq!(caller.ip.as_deref(), Some("203.0.113.9"));
        assert_eq!(caller.fingerprint.as_deref(), Some("fp1"));
        assert_eq!(caller.confidence, Some(0.9));
        assert!(caller.user_id.is_none());
    }

    #[test]
    fn test_caller_identity_empty_headers() {
        let caller = caller_identity(&HeaderMap::new());
        assert!(caller.ip.is_none());
        assert!(caller.fingerprint.is_none());
        assert!(caller.user_id.is_none());
    }

    #[tokio::test]
    async fn test_chat_handler_consumes() {
        let state = test_state();
        let req = ChatRequest {
            message: "hi".to_string(),
        };

        let resp = chat_handler(
            State(state.clone()),
            anon_headers("203.0.113.9"),
            Json(req),
        )
        .await
        .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_chat_handler_rejects_empty_message() {
        let state = test_state();
        let req = ChatRequest {
            message: "".to_string(),
        };

        let result = chat_handler(State(state), anon_headers("203.0.113.9"), Json(req)).await;
        assert!(matches!(result, Err(AppError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn test_admin_requires_token() {
        let state = test_state();

        let result = admin_list_handler(State(state.clone()), HeaderMap::new()).await;
        assert!(matches!(result, Err(AppError::Unauthorized(_))));

        let mut headers = HeaderMap::new();
        headers.insert("authorization", "Bearer admin-secret".parse().unwrap());
        assert!(admin_list_handler(State(state), headers).await.is_ok());
    }

    #[tokio::test]
    async fn test_admin_reset_unknown_type() {
        let state = test_state();
        let mut headers = HeaderMap::new();
        headers.insert("authorization", "Bearer admin-secret".parse().unwrap());

        let req = AdminResetRequest {
            target_type: "session".to_string(),
            target: "x".to_string(),
        };
        let result = admin_reset_handler(State(state), headers, Json(req)).await;
        assert!(matches!(result, Err(AppError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn test_health_handler() {
        let response = health_handler().await;
        assert_eq!(response.status, "healthy");
    }
}
