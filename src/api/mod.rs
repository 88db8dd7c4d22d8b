//! API Module
//!
//! HTTP handlers and routing for the abuse-prevention core.
//!
//! # Endpoints
//! - `POST /chat` - Consume the caller's rate limit (the chat gate)
//! - `GET /rate-limit` - Read-only rate limit status
//! - `POST /ad/token` - Mint a signed ad-completion token
//! - `POST /ad/grant` - Redeem an ad token for a bonus credit
//! - `POST /tts/token` - Mint a one-shot TTS token (trusted flow)
//! - `POST /tts` - Consume a TTS token and return audio bytes
//! - `GET|DELETE /admin/rate-limits` - Admin listing and reset
//! - `GET /health` - Health check endpoint

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
