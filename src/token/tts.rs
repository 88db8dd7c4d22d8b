//! TTS Token Module
//!
//! One-shot tokens binding a token to exact generated text, permitting a
//! single audio generation with cached-audio replay: once the audio is
//! attached to the record, repeated consumption returns the identical bytes
//! without regenerating or re-spending quota.

use async_trait::async_trait;
use base64::Engine;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::cache::{current_timestamp_ms, Cache, TTS_TOKEN_PREFIX};
use crate::error::{AppError, Result};

/// TTS tokens live 30 minutes from creation; every update preserves the
/// original deadline (remaining TTL recomputed, never reset).
pub const TTS_TOKEN_TTL_MS: u64 = 30 * 60 * 1000;

// == Token Record ==
/// Audio payload attached after the first successful generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedAudio {
    /// Base64-encoded audio bytes
    pub data: String,
    pub format: String,
    pub voice: String,
    pub model: String,
}

/// Cache record for one TTS token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TtsTokenData {
    pub text: String,
    pub character_id: Option<String>,
    pub session_id: Option<String>,
    pub created_at: u64,
    pub used_at: Option<u64>,
    pub cached_audio: Option<CachedAudio>,
}

// == Consume Outcome ==
/// Result of `validate_and_consume`.
#[derive(Debug)]
pub enum TtsConsumeOutcome {
    /// First consumption: the caller should generate audio and attach it
    /// via `cache_audio`.
    FirstUse {
        text: String,
        character_id: Option<String>,
        session_id: Option<String>,
    },
    /// The record already carries audio: replay it as-is, no state change.
    Replay {
        audio: Vec<u8>,
        format: String,
        voice: String,
        model: String,
    },
    /// Token rejected with a typed reason.
    Invalid { reason: String },
}

// == TTS Token Service ==
#[derive(Clone)]
pub struct TtsTokenService {
    cache: Cache,
}

impl TtsTokenService {
    // == Constructor ==
    pub fn new(cache: Cache) -> Self {
        Self { cache }
    }

    fn record_key(token: &str) -> String {
        format!("{}{}", TTS_TOKEN_PREFIX, token)
    }

    // == Generate ==
    /// Opaque token id from timestamp plus random bytes. No cryptographic
    /// binding; the trust boundary is the caller's own chat-generation flow.
    pub fn generate_token() -> String {
        let bytes: [u8; 8] = rand::rng().random();
        format!("{}_{}", current_timestamp_ms(), hex::encode(bytes))
    }

    // == Store ==
    /// Persists a freshly minted token bound to exact generated text.
    pub async fn store(
        &self,
        token: &str,
        text: &str,
        character_id: Option<String>,
        session_id: Option<String>,
    ) -> Result<()> {
        let data = TtsTokenData {
            text: text.to_string(),
            character_id,
            session_id,
            created_at: current_timestamp_ms(),
            used_at: None,
            cached_audio: None,
        };
        self.persist(token, &data, TTS_TOKEN_TTL_MS).await
    }

    async fn persist(&self, token: &str, data: &TtsTokenData, ttl_ms: u64) -> Result<()> {
        let value = serde_json::to_value(data)
            .map_err(|e| AppError::Cache(format!("failed to encode tts record: {}", e)))?;
        self.cache
            .set(&Self::record_key(token), value, Some(ttl_ms))
            .await
    }

    async fn load(&self, token: &str) -> Result<Option<TtsTokenData>> {
        let Some(value) = self.cache.get(&Self::record_key(token)).await? else {
            return Ok(None);
        };
        match serde_json::from_value(value) {
            Ok(data) => Ok(Some(data)),
            Err(e) => {
                warn!("Discarding corrupt tts record for {}: {}", token, e);
                let _ = self.cache.delete(&Self::record_key(token)).await;
                Ok(None)
            }
        }
    }

    /// Remaining lifetime measured from the original creation, so updates
    /// never extend the token.
    fn remaining_ttl_ms(data: &TtsTokenData, now: u64) -> u64 {
        (data.created_at + TTS_TOKEN_TTL_MS).saturating_sub(now)
    }

    // == Validate & Consume ==
    /// State machine over the stored record:
    /// - absent → invalid/expired
    /// - cached audio present → replay, no state change
    /// - used without cached audio → invalid (partial-failure guard)
    /// - otherwise → mark used, persist with remaining TTL, first use
    pub async fn validate_and_consume(&self, token: &str) -> Result<TtsConsumeOutcome> {
        let Some(mut data) = self.load(token).await? else {
            return Ok(TtsConsumeOutcome::Invalid {
                reason: "Token invalid or expired".to_string(),
            });
        };

        if let Some(audio) = &data.cached_audio {
            let bytes = match base64::engine::general_purpose::STANDARD.decode(&audio.data) {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!("Cached audio for {} is not valid base64: {}", token, e);
                    return Ok(TtsConsumeOutcome::Invalid {
                        reason: "Cached audio corrupted".to_string(),
                    });
                }
            };
            return Ok(TtsConsumeOutcome::Replay {
                audio: bytes,
                format: audio.format.clone(),
                voice: audio.voice.clone(),
                model: audio.model.clone(),
            });
        }

        if data.used_at.is_some() {
            // Consumed but generation never attached audio: corrupted or
            // incomplete generation, reject rather than regenerate.
            return Ok(TtsConsumeOutcome::Invalid {
                reason: "Token already used but no cached audio".to_string(),
            });
        }

        let now = current_timestamp_ms();
        let remaining = Self::remaining_ttl_ms(&data, now);
        if remaining == 0 {
            return Ok(TtsConsumeOutcome::Invalid {
                reason: "Token invalid or expired".to_string(),
            });
        }

        data.used_at = Some(now);
        self.persist(token, &data, remaining).await?;

        debug!("TTS token {} consumed ({}ms remaining)", token, remaining);
        Ok(TtsConsumeOutcome::FirstUse {
            text: data.text,
            character_id: data.character_id,
            session_id: data.session_id,
        })
    }

    // == Cache Audio ==
    /// Attaches generated audio to the record, preserving the original
    /// creation-based TTL.
    pub async fn cache_audio(
        &self,
        token: &str,
        audio: &[u8],
        format: &str,
        voice: &str,
        model: &str,
    ) -> Result<()> {
        let Some(mut data) = self.load(token).await? else {
            return Err(AppError::NotFound(format!("TTS token not found: {}", token)));
        };

        data.cached_audio = Some(CachedAudio {
            data: base64::engine::general_purpose::STANDARD.encode(audio),
            format: format.to_string(),
            voice: voice.to_string(),
            model: model.to_string(),
        });

        let remaining = Self::remaining_ttl_ms(&data, current_timestamp_ms());
        if remaining == 0 {
            return Err(AppError::NotFound(format!("TTS token expired: {}", token)));
        }
        self.persist(token, &data, remaining).await
    }

    // == Cleanup ==
    /// Manual sweep deleting records past their creation-based TTL.
    /// Defense-in-depth; normal expiry relies on adapter TTLs.
    pub async fn cleanup_expired(&self) -> Result<usize> {
        let now = current_timestamp_ms();
        let mut removed = 0;
        for key in self.cache.keys(&format!("{}*", TTS_TOKEN_PREFIX)).await? {
            let token = key.trim_start_matches(TTS_TOKEN_PREFIX).to_string();
            if let Some(data) = self.load(&token).await? {
                if Self::remaining_ttl_ms(&data, now) == 0 && self.cache.delete(&key).await? {
                    removed += 1;
                }
            }
        }
        Ok(removed)
    }
}

// == Synthesizer Seam ==
/// Audio generation backend. Real provider adapters (OpenAI et al.) live
/// outside this crate; anything implementing this trait can be wired in.
#[async_trait]
pub trait Synthesizer: Send + Sync {
    /// Model identifier reported in response headers.
    fn model(&self) -> &str;

    /// Generates audio bytes for the given text.
    async fn synthesize(
        &self,
        text: &str,
        voice: &str,
        format: &str,
        instructions: Option<&str>,
    ) -> Result<Vec<u8>>;
}

/// Built-in stand-in producing a valid silent WAV sized to the text.
/// Useful for local runs and tests; production wires a real backend.
pub struct StubSynthesizer;

const STUB_SAMPLE_RATE: u32 = 8_000;

#[async_trait]
impl Synthesizer for StubSynthesizer {
    fn model(&self) -> &str {
        "stub-1"
    }

    async fn synthesize(
        &self,
        text: &str,
        _voice: &str,
        _format: &str,
        _instructions: Option<&str>,
    ) -> Result<Vec<u8>> {
        // ~40ms of silence per character, capped at 5 seconds
        let millis = (text.chars().count() as u32 * 40).min(5_000);
        let samples = STUB_SAMPLE_RATE * millis / 1000;
        let data_len = samples * 2; // 16-bit mono

        let mut wav = Vec::with_capacity(44 + data_len as usize);
        wav.extend_from_slice(b"RIFF");
        wav.extend_from_slice(&(36 + data_len).to_le_bytes());
        wav.extend_from_slice(b"WAVEfmt ");
        wav.extend_from_slice(&16u32.to_le_bytes()); // fmt chunk size
        wav.extend_from_slice(&1u16.to_le_bytes()); // PCM
        wav.extend_from_slice(&1u16.to_le_bytes()); // mono
        wav.extend_from_slice(&STUB_SAMPLE_RATE.to_le_bytes());
        wav.extend_from_slice(&(STUB_SAMPLE_RATE * 2).to_le_bytes()); // byte rate
        wav.extend_from_slice(&2u16.to_le_bytes()); // block align
        wav.extend_from_slice(&16u16.to_le_bytes()); // bits per sample
        wav.extend_from_slice(b"data");
        wav.extend_from_slice(&data_len.to_le_bytes());
        wav.resize(44 + data_len as usize, 0);
        Ok(wav)
    }
}
