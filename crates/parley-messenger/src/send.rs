//! Delivery of outbound payloads through the Messenger Send API.

use async_trait::async_trait;
use parley_core::types::OutboundPayload;
use tracing::debug;

use crate::error::SendError;

/// Delivers one outbound payload to the messaging platform.
#[async_trait]
pub trait OutboundSender: Send + Sync {
    async fn send(&self, payload: &OutboundPayload) -> Result<(), SendError>;
}

/// `POST {graph_base}/v{version}/me/messages?access_token=…`
pub struct GraphSender {
    client: reqwest::Client,
    endpoint: String,
    access_token: String,
}

impl GraphSender {
    pub fn new(graph_base: &str, api_version: &str, access_token: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: messages_endpoint(graph_base, api_version),
            access_token: access_token.into(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

fn messages_endpoint(graph_base: &str, api_version: &str) -> String {
    let version = api_version.trim_start_matches('v');
    format!("{}/v{}/me/messages", graph_base.trim_end_matches('/'), version)
}

#[async_trait]
impl OutboundSender for GraphSender {
    async fn send(&self, payload: &OutboundPayload) -> Result<(), SendError> {
        let resp = self
            .client
            .post(&self.endpoint)
            .query(&[("access_token", self.access_token.as_str())])
            .json(payload)
            .send()
            .await
            .map_err(|e| SendError::Http(e.without_url()))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(SendError::Api {
                status: status.as_u16(),
                message: text,
            });
        }

        debug!(
            recipient = %payload.recipient.id,
            status = status.as_u16(),
            "Send API accepted message"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use parley_core::types::SenderId;

    #[test]
    fn endpoint_includes_version_segment() {
        assert_eq!(
            messages_endpoint("https://graph.facebook.com/", "2.11"),
            "https://graph.facebook.com/v2.11/me/messages"
        );
        // a leading "v" in config is tolerated
        assert_eq!(
            messages_endpoint("https://graph.facebook.com", "v19.0"),
            "https://graph.facebook.com/v19.0/me/messages"
        );
    }

    #[tokio::test]
    async fn send_posts_payload_with_token_query() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v2.11/me/messages")
            .match_query(Matcher::UrlEncoded(
                "access_token".into(),
                "page-token".into(),
            ))
            .match_body(Matcher::Json(serde_json::json!({
                "recipient": {"id": "123"},
                "message": {"text": "hello"}
            })))
            .with_status(200)
            .with_body(r#"{"recipient_id":"123","message_id":"mid.1"}"#)
            .create_async()
            .await;

        let sender = GraphSender::new(&server.url(), "2.11", "page-token");
        sender
            .send(&OutboundPayload::text(&SenderId::from("123"), "hello"))
            .await
            .unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn non_success_status_is_api_error_with_body() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/v2.11/me/messages")
            .match_query(Matcher::Any)
            .with_status(400)
            .with_body(r#"{"error":{"message":"Invalid OAuth access token.","code":190}}"#)
            .create_async()
            .await;

        let sender = GraphSender::new(&server.url(), "2.11", "bad-token");
        let err = sender
            .send(&OutboundPayload::text(&SenderId::from("123"), "hello"))
            .await
            .unwrap_err();
        match err {
            SendError::Api { status, message } => {
                assert_eq!(status, 400);
                assert!(message.contains("Invalid OAuth access token."));
            }
            other => panic!("expected Api error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unreachable_host_is_http_error() {
        // port 9 (discard) on localhost is not listening in test environments
        let sender = GraphSender::new("http://127.0.0.1:9", "2.11", "t");
        let err = sender
            .send(&OutboundPayload::text(&SenderId::from("1"), "x"))
            .await
            .unwrap_err();
        assert!(matches!(err, SendError::Http(_)));
    }

    #[tokio::test]
    async fn transport_error_does_not_leak_page_token() {
        let sender = GraphSender::new("http://127.0.0.1:9", "2.11", "SECRET-PAGE-TOKEN");
        let err = sender
            .send(&OutboundPayload::text(&SenderId::from("1"), "x"))
            .await
            .unwrap_err();
        let shown = err.to_string();
        assert!(!shown.contains("SECRET-PAGE-TOKEN"), "{shown}");
        assert!(!format!("{err:?}").contains("SECRET-PAGE-TOKEN"));
    }
}
