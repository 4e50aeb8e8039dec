//! Cloud Pub/Sub subscription client (REST `pull` + `acknowledge`).

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::auth::{AuthError, TokenSource};

#[derive(Debug, thiserror::Error)]
pub enum PubSubError {
    #[error("auth error: {0}")]
    Auth(#[from] AuthError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Pub/Sub API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("message data is not valid base64: {0}")]
    Data(String),
}

/// One message delivered by a pull.
#[derive(Debug, Clone)]
pub struct ReceivedMessage {
    pub ack_id: String,
    pub message_id: String,
    pub publish_time: Option<DateTime<Utc>>,
    pub attributes: HashMap<String, String>,
    /// Payload exactly as carried on the wire (base64).
    pub data_b64: String,
}

impl ReceivedMessage {
    /// Decoded payload bytes.
    pub fn data(&self) -> Result<Vec<u8>, PubSubError> {
        STANDARD
            .decode(&self.data_b64)
            .map_err(|e| PubSubError::Data(e.to_string()))
    }
}

/// A queue the listener can pull from and acknowledge to.
#[async_trait]
pub trait MessageSource: Send + Sync {
    /// Human-readable source name for logs.
    fn name(&self) -> &str;

    /// Wait for the next batch of at most `max_messages` messages.
    async fn pull(&self, max_messages: u32) -> Result<Vec<ReceivedMessage>, PubSubError>;

    /// Acknowledge delivered messages so they are not redelivered.
    async fn acknowledge(&self, ack_ids: &[String]) -> Result<(), PubSubError>;
}

/// REST client bound to one subscription.
pub struct SubscriptionClient {
    client: reqwest::Client,
    api_base: String,
    subscription_path: String,
    tokens: Arc<dyn TokenSource>,
}

impl SubscriptionClient {
    pub fn new(
        api_base: &str,
        project_id: &str,
        subscription: &str,
        tokens: Arc<dyn TokenSource>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base: api_base.trim_end_matches('/').to_string(),
            subscription_path: subscription_path(project_id, subscription),
            tokens,
        }
    }

    pub fn subscription_path(&self) -> &str {
        &self.subscription_path
    }

    fn endpoint(&self, verb: &str) -> String {
        format!("{}/v1/{}:{}", self.api_base, self.subscription_path, verb)
    }

    async fn post(
        &self,
        verb: &str,
        body: serde_json::Value,
    ) -> Result<reqwest::Response, PubSubError> {
        let token = self.tokens.access_token().await?;
        let resp = self
            .client
            .post(self.endpoint(verb))
            .bearer_auth(&token)
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let text = resp.text().await.unwrap_or_default();
            warn!(status, body = %text, verb, "Pub/Sub error");
            return Err(PubSubError::Api {
                status,
                message: text,
            });
        }
        Ok(resp)
    }
}

#[async_trait]
impl MessageSource for SubscriptionClient {
    fn name(&self) -> &str {
        &self.subscription_path
    }

    async fn pull(&self, max_messages: u32) -> Result<Vec<ReceivedMessage>, PubSubError> {
        let resp = self
            .post("pull", serde_json::json!({ "maxMessages": max_messages }))
            .await?;
        let pulled: PullResponse = resp.json().await?;

        debug!(
            subscription = %self.subscription_path,
            count = pulled.received_messages.len(),
            "pulled messages"
        );

        Ok(pulled
            .received_messages
            .into_iter()
            .map(|r| ReceivedMessage {
                ack_id: r.ack_id,
                message_id: r.message.message_id,
                publish_time: r.message.publish_time,
                attributes: r.message.attributes,
                data_b64: r.message.data,
            })
            .collect())
    }

    async fn acknowledge(&self, ack_ids: &[String]) -> Result<(), PubSubError> {
        if ack_ids.is_empty() {
            return Ok(());
        }
        self.post("acknowledge", serde_json::json!({ "ackIds": ack_ids }))
            .await?;
        Ok(())
    }
}

/// Full subscription resource name.
pub fn subscription_path(project_id: &str, subscription: &str) -> String {
    format!("projects/{project_id}/subscriptions/{subscription}")
}

// ── Wire types ───────────────────────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PullResponse {
    #[serde(default)]
    received_messages: Vec<WireReceivedMessage>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireReceivedMessage {
    ack_id: String,
    message: WireMessage,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireMessage {
    #[serde(default)]
    data: String,
    #[serde(default)]
    message_id: String,
    publish_time: Option<DateTime<Utc>>,
    #[serde(default)]
    attributes: HashMap<String, String>,
}
