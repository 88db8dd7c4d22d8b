//! Integration Tests for API Endpoints
//!
//! Tests full request/response cycle for each endpoint over a tiered
//! memory + filesystem cache, exactly as wired in production.

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use chatguard::cache::{Cache, FilesystemAdapter, MemoryAdapter, TieredCache};
use chatguard::{create_router, AppState, Config};

// == Helper Functions ==

fn base_config() -> Config {
    Config {
        admin_token: Some("admin-secret".to_string()),
        ..Default::default()
    }
}

fn rewards_config() -> Config {
    Config {
        ad_rewards_enabled: true,
        ad_token_secret: Some("integration-test-secret".to_string()),
        ..base_config()
    }
}

async fn create_test_app(config: Config) -> (tempfile::TempDir, Router) {
    let dir = tempfile::tempdir().unwrap();
    let memory = Arc::new(MemoryAdapter::new(config.memory_default_ttl));
    let filesystem = Arc::new(FilesystemAdapter::new(dir.path()).await.unwrap());
    let fast_ttl = memory.default_ttl_ms();
    let cache = Cache::new(Arc::new(TieredCache::new(memory, filesystem, fast_ttl)));
    let state = AppState::with_stub_synthesizer(cache, &config).unwrap();
    (dir, create_router(state))
}

async fn body_to_json(body: Body) -> Value {
    let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn body_to_bytes(body: Body) -> Vec<u8> {
    axum::body::to_bytes(body, usize::MAX).await.unwrap().to_vec()
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .header("x-forwarded-for", "203.0.113.9")
        .header("x-fingerprint", "fp-integration")
        .body(Body::from(body.to_string()))
        .unwrap()
}

// == Health Endpoint Tests ==

#[tokio::test]
async fn test_health_endpoint() {
    let (_dir, app) = create_test_app(base_config()).await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["status"], "healthy");
    assert!(json.get("timestamp").is_some());
}

// == Chat Gate Tests ==

#[tokio::test]
async fn test_chat_anonymous_limit_enforced() {
    let (_dir, app) = create_test_app(base_config()).await;

    // Default anonymous limit is 3 per day; remaining counts the request
    // just granted, so the last allowed call reports zero
    for expected_remaining in [2u64, 1, 0] {
        let response = app
            .clone()
            .oneshot(json_request("POST", "/chat", json!({"message": "hi"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_to_json(response.into_body()).await;
        assert_eq!(json["allowed"], true);
        assert_eq!(json["remaining"], expected_remaining);
        assert_eq!(json["method"], "ip");
    }

    let response = app
        .oneshot(json_request("POST", "/chat", json!({"message": "hi"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["allowed"], false);
    assert_eq!(json["remaining"], 0);
    assert_eq!(json["requiresAuth"], true);
    assert_eq!(json["isLoggedIn"], false);
}

#[tokio::test]
async fn test_chat_rejects_empty_message() {
    let (_dir, app) = create_test_app(base_config()).await;

    let response = app
        .oneshot(json_request("POST", "/chat", json!({"message": "  "})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["error"], "invalid_request");
}

#[tokio::test]
async fn test_rate_limit_endpoint_is_read_only() {
    let (_dir, app) = create_test_app(base_config()).await;

    for _ in 0..5 {
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/rate-limit")
                    .header("x-forwarded-for", "203.0.113.9")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_to_json(response.into_body()).await;
        assert_eq!(json["remaining"], 3);
    }
}

#[tokio::test]
async fn test_authenticated_user_gets_higher_limit() {
    let (_dir, app) = create_test_app(base_config()).await;

    let mut request = json_request("POST", "/chat", json!({"message": "hi"}));
    request
        .headers_mut()
        .insert("x-user-id", "user-42".parse().unwrap());

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["limit"], 10);
    assert_eq!(json["isLoggedIn"], true);
    assert_eq!(json["method"], "user");
}

// == Ad Reward Tests ==

#[tokio::test]
async fn test_ad_token_disabled_returns_503() {
    let (_dir, app) = create_test_app(base_config()).await;

    let response = app
        .oneshot(json_request(
            "POST",
            "/ad/token",
            json!({"fingerprint": "fp-integration"}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["error"], "feature_disabled");
}

#[tokio::test]
async fn test_ad_reward_full_flow() {
    let (_dir, app) = create_test_app(rewards_config()).await;

    // Mint a token bound to the fingerprint
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/ad/token",
            json!({"fingerprint": "fp-integration"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["success"], true);
    assert_eq!(json["expiresIn"], 300);
    let ad_token = json["adToken"].as_str().unwrap().to_string();

    // Redeem it: one bonus credit on top of the base allowance
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/ad/grant",
            json!({"adToken": &ad_token, "fingerprint": "fp-integration"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["success"], true);
    assert_eq!(json["remaining"], 4);

    // Replaying the same token is rejected
    let response = app
        .oneshot(json_request(
            "POST",
            "/ad/grant",
            json!({"adToken": &ad_token, "fingerprint": "fp-integration"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["message"], "Token already used");
}

#[tokio::test]
async fn test_bonus_credit_spendable_after_denied_chat() {
    let (_dir, app) = create_test_app(rewards_config()).await;

    // Exhaust the anonymous allowance, then keep knocking
    for _ in 0..3 {
        let response = app
            .clone()
            .oneshot(json_request("POST", "/chat", json!({"message": "hi"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
    let response = app
        .clone()
        .oneshot(json_request("POST", "/chat", json!({"message": "hi"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

    // Earn a bonus credit through the rewarded-ad flow
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/ad/token",
            json!({"fingerprint": "fp-integration"}),
        ))
        .await
        .unwrap();
    let ad_token = body_to_json(response.into_body()).await["adToken"]
        .as_str()
        .unwrap()
        .to_string();

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/ad/grant",
            json!({"adToken": &ad_token, "fingerprint": "fp-integration"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // The credit earned after the denial still buys one more chat
    let response = app
        .clone()
        .oneshot(json_request("POST", "/chat", json!({"message": "hi"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(json_request("POST", "/chat", json!({"message": "hi"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn test_ad_grant_fingerprint_mismatch() {
    let (_dir, app) = create_test_app(rewards_config()).await;

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/ad/token",
            json!({"fingerprint": "fp-A"}),
        ))
        .await
        .unwrap();
    let ad_token = body_to_json(response.into_body()).await["adToken"]
        .as_str()
        .unwrap()
        .to_string();

    let response = app
        .oneshot(json_request(
            "POST",
            "/ad/grant",
            json!({"adToken": ad_token, "fingerprint": "fp-B"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["message"], "Fingerprint mismatch");
}

// == TTS Tests ==

#[tokio::test]
async fn test_tts_token_then_generation_and_replay() {
    let (_dir, app) = create_test_app(base_config()).await;

    // Trusted flow mints a token for the generated reply text
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/tts/token",
            json!({"text": "hello from the test", "characterId": "char1"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["expiresIn"], 1800);
    let tts_token = json["ttsToken"].as_str().unwrap().to_string();

    // First consumption generates audio
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/tts",
            json!({"ttsToken": &tts_token, "format": "wav"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-cache"], "MISS");
    assert_eq!(response.headers()["content-type"], "audio/wav");
    let first = body_to_bytes(response.into_body()).await;
    assert!(!first.is_empty());

    // Replay serves the identical bytes from the cached copy
    let response = app
        .oneshot(json_request("POST", "/tts", json!({"ttsToken": &tts_token})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-cache"], "HIT");
    let replayed = body_to_bytes(response.into_body()).await;
    assert_eq!(replayed, first);
}

#[tokio::test]
async fn test_tts_unknown_token_rejected() {
    let (_dir, app) = create_test_app(base_config()).await;

    let response = app
        .oneshot(json_request(
            "POST",
            "/tts",
            json!({"ttsToken": "1234_deadbeef"}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["message"], "Token invalid or expired");
}

// == Admin Endpoint Tests ==

#[tokio::test]
async fn test_admin_requires_bearer_token() {
    let (_dir, app) = create_test_app(base_config()).await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/admin/rate-limits")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_admin_list_and_reset_flow() {
    let (_dir, app) = create_test_app(base_config()).await;

    // Consume the full anonymous allowance
    for _ in 0..3 {
        app.clone()
            .oneshot(json_request("POST", "/chat", json!({"message": "hi"})))
            .await
            .unwrap();
    }

    // The record shows up in the admin listing
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/admin/rate-limits")
                .header("authorization", "Bearer admin-secret")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["ip"].as_array().unwrap().len(), 1);

    // Reset by raw IP; the handler hashes it the same way the limiter does
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri("/admin/rate-limits")
                .header("content-type", "application/json")
                .header("authorization", "Bearer admin-secret")
                .body(Body::from(
                    json!({"type": "ip", "target": "203.0.113.9"}).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // The caller starts over with a fresh allowance
    let response = app
        .oneshot(json_request("POST", "/chat", json!({"message": "hi"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["remaining"], 2);
}
