//! Request DTOs for the HTTP API
//!
//! Defines the structure of incoming HTTP request bodies.

use serde::Deserialize;

/// Request body for the chat gate (POST /chat)
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    /// The user's chat message (content is handled upstream; the gate only
    /// validates that a message is present)
    pub message: String,
}

impl ChatRequest {
    /// Validates the request data.
    ///
    /// Returns an error message if validation fails, None if valid.
    pub fn validate(&self) -> Option<String> {
        if self.message.trim().is_empty() {
            return Some("Message cannot be empty".to_string());
        }
        if self.message.len() > 4096 {
            return Some("Message exceeds maximum length of 4096 characters".to_string());
        }
        None
    }
}

/// Request body for ad token generation (POST /ad/token)
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdTokenRequest {
    pub fingerprint: String,
}

impl AdTokenRequest {
    pub fn validate(&self) -> Option<String> {
        if self.fingerprint.trim().is_empty() {
            return Some("Fingerprint cannot be empty".to_string());
        }
        None
    }
}

/// Request body for the ad credit grant (POST /ad/grant)
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdGrantRequest {
    pub ad_token: String,
    pub fingerprint: String,
}

impl AdGrantRequest {
    pub fn validate(&self) -> Option<String> {
        if self.ad_token.trim().is_empty() {
            return Some("Ad token cannot be empty".to_string());
        }
        if self.fingerprint.trim().is_empty() {
            return Some("Fingerprint cannot be empty".to_string());
        }
        None
    }
}

/// Request body for TTS token minting (POST /tts/token)
///
/// Issued by the trusted chat-generation flow after a reply is produced,
/// binding the token to the exact generated text.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TtsTokenRequest {
    pub text: String,
    #[serde(default)]
    pub character_id: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
}

impl TtsTokenRequest {
    pub fn validate(&self) -> Option<String> {
        if self.text.trim().is_empty() {
            return Some("Text cannot be empty".to_string());
        }
        None
    }
}

/// Request body for audio generation (POST /tts)
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TtsRequest {
    pub tts_token: String,
    #[serde(default)]
    pub voice: Option<String>,
    #[serde(default)]
    pub instructions: Option<String>,
    #[serde(default)]
    pub format: Option<String>,
}

impl TtsRequest {
    pub fn validate(&self) -> Option<String> {
        if self.tts_token.trim().is_empty() {
            return Some("TTS token cannot be empty".to_string());
        }
        None
    }
}

/// Request body for the admin reset (DELETE /admin/rate-limits)
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminResetRequest {
    /// Dimension to reset: "ip", "fingerprint" or "user"
    #[serde(rename = "type")]
    pub target_type: String,
    /// Identity to reset (raw IP, fingerprint or user id)
    pub target: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_request_deserialize() {
        let json = r#"{"message": "hello"}"#;
        let req: ChatRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.message, "hello");
        assert!(req.validate().is_none());
    }

    #[test]
    fn test_chat_request_empty_message() {
        let req = ChatRequest {
            message: "   ".to_string(),
        };
        assert!(req.validate().is_some());
    }

    #[test]
    fn test_ad_grant_request_camel_case() {
        let json = r#"{"adToken": "jwt.here", "fingerprint": "fp1"}"#;
        let req: AdGrantRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.ad_token, "jwt.here");
        assert!(req.validate().is_none());
    }

    #[test]
    fn test_tts_request_defaults() {
        let json = r#"{"ttsToken": "123_abc"}"#;
        let req: TtsRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.tts_token, "123_abc");
        assert!(req.voice.is_none());
        assert!(req.format.is_none());
    }

    #[test]
    fn test_admin_reset_request_type_field() {
        let json = r#"{"type": "ip", "target": "203.0.113.9"}"#;
        let req: AdminResetRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.target_type, "ip");
        assert_eq!(req.target, "203.0.113.9");
    }
}
