//! Voice-platform request and response envelopes.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::SessionState;

pub const PROTOCOL_VERSION: &str = "1.0";

/// What the turn handler needs from an inbound envelope
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TurnRequest {
    pub user_id: Option<String>,
    pub session_id: Option<String>,
    /// Lower-cased, trimmed utterance
    pub utterance: String,
    /// Trimmed utterance with its original casing
    pub raw_utterance: String,
    pub state: Option<SessionState>,
}

impl TurnRequest {
    /// Extract the turn from a raw envelope. Missing or mistyped fields are
    /// treated as absent rather than rejected.
    pub fn from_envelope(envelope: &Value) -> Self {
        let text_at = |pointer: &str| {
            envelope
                .pointer(pointer)
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };

        let user_id = text_at("/session/user/user_id").or_else(|| text_at("/session/user_id"));
        let raw_utterance = text_at("/request/command")
            .or_else(|| text_at("/request/original_utterance"))
            .unwrap_or_default();
        let state = envelope
            .pointer("/state/session")
            .filter(|value| !value.is_null())
            .and_then(|value| serde_json::from_value::<SessionState>(value.clone()).ok());

        Self {
            user_id,
            session_id: text_at("/session/session_id"),
            utterance: raw_utterance.to_lowercase(),
            raw_utterance,
            state,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundResponse {
    pub text: String,
    pub end_session: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundEnvelope {
    pub version: String,
    pub response: OutboundResponse,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_state: Option<SessionState>,
}

impl OutboundEnvelope {
    pub fn reply(text: impl Into<String>, session_state: Option<SessionState>) -> Self {
        Self {
            version: PROTOCOL_VERSION.to_string(),
            response: OutboundResponse {
                text: text.into(),
                end_session: false,
            },
            session_state,
        }
    }
}
