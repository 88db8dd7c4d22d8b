//! Routes Module
//!
//! Builds the axum router: endpoint wiring plus the CORS and tracing
//! layers shared by every route.

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::api::handlers::{
    ad_grant_handler, ad_token_handler, admin_list_handler, admin_reset_handler, chat_handler,
    health_handler, rate_limit_handler, tts_handler, tts_token_handler, AppState,
};

/// Creates the application router with all endpoints and middleware.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/chat", post(chat_handler))
        .route("/rate-limit", get(rate_limit_handler))
        .route("/ad/token", post(ad_token_handler))
        .route("/ad/grant", post(ad_grant_handler))
        .route("/tts/token", post(tts_token_handler))
        .route("/tts", post(tts_handler))
        .route(
            "/admin/rate-limits",
            get(admin_list_handler).delete(admin_reset_handler),
        )
        .route("/health", get(health_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
