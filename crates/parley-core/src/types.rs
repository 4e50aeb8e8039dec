use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{ParleyError, Result};

/// Opaque identifier of the person on the messaging platform (page-scoped id).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SenderId(pub String);

impl SenderId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SenderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for SenderId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for SenderId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

// ── Inbound ──────────────────────────────────────────────────────────────────

/// A messaging event as published to the queue by the webhook side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundEvent {
    pub sender: Sender,
    pub message: InboundText,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sender {
    pub id: SenderId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundText {
    pub text: String,
}

impl InboundEvent {
    /// Decode raw queue bytes: UTF-8 first, then JSON.
    pub fn decode(data: &[u8]) -> Result<Self> {
        let raw = std::str::from_utf8(data)
            .map_err(|e| ParleyError::Decode(format!("payload is not UTF-8: {e}")))?;
        serde_json::from_str(raw)
            .map_err(|e| ParleyError::Decode(format!("payload is not an inbound event: {e}")))
    }

    pub fn sender_id(&self) -> &SenderId {
        &self.sender.id
    }

    pub fn text(&self) -> &str {
        &self.message.text
    }
}

// ── Intent detection ─────────────────────────────────────────────────────────

/// One text query against the NLU agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntentQuery {
    /// Full session resource name, `projects/<id>/agent/sessions/<session>`.
    pub session_path: String,
    pub text: String,
    pub language_code: String,
}

impl IntentQuery {
    pub fn new(
        session_path: impl Into<String>,
        text: impl Into<String>,
        language_code: impl Into<String>,
    ) -> Self {
        Self {
            session_path: session_path.into(),
            text: text.into(),
            language_code: language_code.into(),
        }
    }
}

/// Build the session resource name for a project/session pair.
pub fn session_path(project_id: &str, session_id: &str) -> String {
    format!("projects/{project_id}/agent/sessions/{session_id}")
}

/// A reply variant produced by the NLU agent for one query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FulfillmentMessage {
    Text { lines: Vec<String> },
    QuickReplies { title: String, options: Vec<String> },
    /// Any other kind (card, image, custom payload, …). Never dispatched.
    Unsupported { kind: String },
}

impl FulfillmentMessage {
    /// Discriminator name as used on the wire.
    pub fn kind(&self) -> &str {
        match self {
            FulfillmentMessage::Text { .. } => "text",
            FulfillmentMessage::QuickReplies { .. } => "quickReplies",
            FulfillmentMessage::Unsupported { kind } => kind,
        }
    }
}

/// One response of an intent-detection call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IntentResponse {
    /// Display name of the matched intent, if any.
    pub intent: Option<String>,
    pub confidence: Option<f32>,
    pub fulfillment_text: Option<String>,
    pub messages: Vec<FulfillmentMessage>,
}

// ── Outbound ─────────────────────────────────────────────────────────────────

pub const QUICK_REPLY_CONTENT_TYPE: &str = "text";

/// Body of one Send API call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundPayload {
    pub recipient: Recipient,
    pub message: OutboundMessage,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipient {
    pub id: SenderId,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quick_replies: Option<Vec<QuickReply>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuickReply {
    pub content_type: String,
    pub title: String,
    pub payload: String,
}

impl QuickReply {
    /// A text quick reply whose title and payload are both `option`.
    pub fn text(option: &str) -> Self {
        Self {
            content_type: QUICK_REPLY_CONTENT_TYPE.to_string(),
            title: option.to_string(),
            payload: option.to_string(),
        }
    }
}

impl OutboundPayload {
    /// An empty message addressed to `recipient`.
    pub fn to(recipient: &SenderId) -> Self {
        Self {
            recipient: Recipient {
                id: recipient.clone(),
            },
            message: OutboundMessage::default(),
        }
    }

    pub fn text(recipient: &SenderId, text: &str) -> Self {
        let mut payload = Self::to(recipient);
        payload.message.text = Some(text.to_string());
        payload
    }

    pub fn quick_replies(recipient: &SenderId, title: &str, options: &[String]) -> Self {
        let mut payload = Self::to(recipient);
        payload.message.text = Some(title.to_string());
        payload.message.quick_replies =
            Some(options.iter().map(|o| QuickReply::text(o)).collect());
        payload
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_valid_event() {
        let raw = br#"{"sender":{"id":"42"},"message":{"text":"hi"},"timestamp":1}"#;
        let event = InboundEvent::decode(raw).unwrap();
        assert_eq!(event.sender_id().as_str(), "42");
        assert_eq!(event.text(), "hi");
    }

    #[test]
    fn decode_rejects_invalid_utf8() {
        let err = InboundEvent::decode(&[0xff, 0xfe, 0x00]).unwrap_err();
        assert_eq!(err.code(), "DECODE_ERROR");
        assert!(err.to_string().contains("UTF-8"));
    }

    #[test]
    fn decode_rejects_missing_text() {
        let err = InboundEvent::decode(br#"{"sender":{"id":"42"},"message":{}}"#).unwrap_err();
        assert_eq!(err.code(), "DECODE_ERROR");
    }

    #[test]
    fn session_path_format() {
        assert_eq!(
            session_path("my-agent", "mySession1"),
            "projects/my-agent/agent/sessions/mySession1"
        );
    }

    #[test]
    fn text_payload_omits_quick_replies() {
        let payload = OutboundPayload::text(&SenderId::from("7"), "hello");
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"recipient": {"id": "7"}, "message": {"text": "hello"}})
        );
    }

    #[test]
    fn unsupported_kind_reports_its_name() {
        let msg = FulfillmentMessage::Unsupported {
            kind: "card".into(),
        };
        assert_eq!(msg.kind(), "card");
    }
}
