//! Dialogflow v2 `detectIntent` client.

use async_trait::async_trait;
use parley_core::types::{FulfillmentMessage, IntentQuery, IntentResponse};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::auth::TokenSource;
use crate::resolver::{IntentResolver, ResolveError};

pub struct DialogflowResolver {
    client: reqwest::Client,
    api_base: String,
    tokens: Arc<dyn TokenSource>,
}

impl DialogflowResolver {
    pub fn new(api_base: &str, tokens: Arc<dyn TokenSource>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base: api_base.trim_end_matches('/').to_string(),
            tokens,
        }
    }

    fn endpoint(&self, session_path: &str) -> String {
        format!("{}/v2/{}:detectIntent", self.api_base, session_path)
    }

    fn build_body(query: &IntentQuery) -> serde_json::Value {
        serde_json::json!({
            "queryInput": {
                "text": {
                    "text": query.text,
                    "languageCode": query.language_code,
                }
            }
        })
    }
}

#[async_trait]
impl IntentResolver for DialogflowResolver {
    fn name(&self) -> &str {
        "dialogflow"
    }

    async fn resolve(&self, query: &IntentQuery) -> Result<Vec<IntentResponse>, ResolveError> {
        let token = self.tokens.access_token().await?;
        let url = self.endpoint(&query.session_path);

        debug!(session = %query.session_path, "sending detectIntent");

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&token)
            .json(&Self::build_body(query))
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let text = resp.text().await.unwrap_or_default();
            warn!(status, body = %text, "Dialogflow error");
            return Err(ResolveError::Api {
                status,
                message: text,
            });
        }

        let api_resp: DetectIntentResponse = resp
            .json()
            .await
            .map_err(|e| ResolveError::Parse(e.to_string()))?;

        let response = api_resp.into_intent_response();
        debug!(
            intent = response.intent.as_deref().unwrap_or("-"),
            confidence = response.confidence.unwrap_or_default(),
            fulfillment = response.fulfillment_text.as_deref().unwrap_or(""),
            messages = response.messages.len(),
            "intent detected"
        );
        Ok(vec![response])
    }
}

// ── Response types ───────────────────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DetectIntentResponse {
    query_result: Option<QueryResult>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryResult {
    fulfillment_text: Option<String>,
    #[serde(default)]
    fulfillment_messages: Vec<WireFulfillmentMessage>,
    intent: Option<WireIntent>,
    intent_detection_confidence: Option<f32>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireIntent {
    display_name: Option<String>,
}

/// A fulfillment message in either the REST `oneof` form (`{"text": {...}}`)
/// or the client-library form carrying an explicit `message` discriminator.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireFulfillmentMessage {
    message: Option<String>,
    text: Option<WireText>,
    quick_replies: Option<WireQuickReplies>,
    #[serde(flatten)]
    other: serde_json::Map<String, serde_json::Value>,
}

#[derive(Deserialize)]
struct WireText {
    #[serde(default)]
    text: Vec<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireQuickReplies {
    #[serde(default)]
    title: String,
    #[serde(default)]
    quick_replies: Vec<String>,
}

impl DetectIntentResponse {
    fn into_intent_response(self) -> IntentResponse {
        let Some(result) = self.query_result else {
            return IntentResponse::default();
        };
        IntentResponse {
            intent: result.intent.and_then(|i| i.display_name),
            confidence: result.intent_detection_confidence,
            fulfillment_text: result.fulfillment_text,
            messages: result
                .fulfillment_messages
                .into_iter()
                .map(WireFulfillmentMessage::classify)
                .collect(),
        }
    }
}

impl WireFulfillmentMessage {
    fn classify(self) -> FulfillmentMessage {
        let kind = match self.message {
            Some(kind) => kind,
            None if self.text.is_some() => "text".to_string(),
            None if self.quick_replies.is_some() => "quickReplies".to_string(),
            None => self
                .other
                .keys()
                .find(|k| k.as_str() != "platform")
                .cloned()
                .unwrap_or_else(|| "unknown".to_string()),
        };

        match kind.as_str() {
            "text" => FulfillmentMessage::Text {
                lines: self.text.map(|t| t.text).unwrap_or_default(),
            },
            "quickReplies" => {
                let qr = self.quick_replies.unwrap_or(WireQuickReplies {
                    title: String::new(),
                    quick_replies: Vec::new(),
                });
                FulfillmentMessage::QuickReplies {
                    title: qr.title,
                    options: qr.quick_replies,
                }
            }
            _ => FulfillmentMessage::Unsupported { kind },
        }
    }
}
