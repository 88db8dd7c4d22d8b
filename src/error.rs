//! Error types for the abuse-prevention core
//!
//! Provides unified error handling using thiserror.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

// == App Error Enum ==
/// Unified error type for the service.
///
/// Internal components prefer returning sentinel values (`Option`,
/// `{valid: false, reason}`) over errors; the variants here cover what is
/// left: configuration faults, cache backend failures and request-level
/// problems surfaced at the HTTP boundary.
#[derive(Error, Debug)]
pub enum AppError {
    /// Key or resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid request data or invalid token
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Missing or invalid admin credentials
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Rate or ad-watch quota exceeded
    #[error("Limit exceeded: {0}")]
    LimitExceeded(String),

    /// Feature flag disabled (ad rewards subsystem off)
    #[error("Feature disabled: {0}")]
    FeatureDisabled(String),

    /// Configuration fault (missing signing secret while rewards enabled)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Cache backend failure that could not be recovered locally
    #[error("Cache error: {0}")]
    Cache(String),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),
}

// == IntoResponse Implementation ==
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg.clone()),
            AppError::InvalidRequest(msg) => {
                (StatusCode::BAD_REQUEST, "invalid_request", msg.clone())
            }
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "unauthorized", msg.clone()),
            AppError::LimitExceeded(msg) => {
                (StatusCode::TOO_MANY_REQUESTS, "limit_exceeded", msg.clone())
            }
            AppError::FeatureDisabled(msg) => {
                (StatusCode::SERVICE_UNAVAILABLE, "feature_disabled", msg.clone())
            }
            // Configuration and backend faults are internal; clients get a
            // generic message, never the underlying reason.
            AppError::Config(_) | AppError::Cache(_) | AppError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "Internal server error".to_string(),
            ),
        };

        let body = Json(json!({
            "error": error,
            "message": message
        }));

        (status, body).into_response()
    }
}

// == Result Type Alias ==
/// Convenience Result type for the service.
pub type Result<T> = std::result::Result<T, AppError>;
