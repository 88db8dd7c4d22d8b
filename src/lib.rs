//! Chat Guard - rate limiting and abuse prevention for a character chat app
//!
//! Multi-dimensional rate limiting (IP, fingerprint, user) over a tiered
//! memory + filesystem cache, rewarded-ad bonus credits backed by signed
//! one-time tokens, and one-shot TTS tokens with cached-audio replay.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod limit;
pub mod models;
pub mod tasks;
pub mod token;

pub use api::{create_router, AppState};
pub use config::Config;
pub use tasks::spawn_cleanup_task;
