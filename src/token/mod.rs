//! Token Module
//!
//! One-time token services: signed ad-completion tokens with replay
//! protection, and one-shot TTS tokens binding a token to exact generated
//! text with cached-audio replay.

mod ad;
mod tts;

pub use ad::{AdTokenClaims, AdTokenService, AdTokenValidation, AD_TOKEN_TTL_SECS};
pub use tts::{
    StubSynthesizer, Synthesizer, TtsConsumeOutcome, TtsTokenData, TtsTokenService,
    TTS_TOKEN_TTL_MS,
};
