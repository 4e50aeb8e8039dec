//! Per-event relay: queue message → intent detection → reply dispatch.

use std::sync::Arc;

use parley_core::types::{InboundEvent, IntentQuery};
use parley_gcp::pubsub::ReceivedMessage;
use parley_gcp::resolver::IntentResolver;
use parley_messenger::dispatch::Dispatcher;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::listener::EventHandler;

#[derive(Clone)]
pub struct RelayHandler {
    resolver: Arc<dyn IntentResolver>,
    dispatcher: Arc<Dispatcher>,
    session_path: String,
    language_code: String,
}

impl RelayHandler {
    pub fn new(
        resolver: Arc<dyn IntentResolver>,
        dispatcher: Dispatcher,
        session_path: String,
        language_code: String,
    ) -> Self {
        Self {
            resolver,
            dispatcher: Arc::new(dispatcher),
            session_path,
            language_code,
        }
    }

    /// Decode a queue message, logging its raw content first.
    /// Returns `None` (after logging) when the payload is not an event.
    fn decode(message: &ReceivedMessage) -> Option<InboundEvent> {
        let data = match message.data() {
            Ok(data) => data,
            Err(e) => {
                warn!(
                    message_id = %message.message_id,
                    raw = %message.data_b64,
                    error = %e,
                    "dropping queue message with unreadable data"
                );
                return None;
            }
        };

        info!(
            message_id = %message.message_id,
            published = ?message.publish_time,
            attributes = ?message.attributes,
            raw = %String::from_utf8_lossy(&data),
            "queue event"
        );

        match InboundEvent::decode(&data) {
            Ok(event) => Some(event),
            Err(e) => {
                error!(
                    message_id = %message.message_id,
                    code = e.code(),
                    error = %e,
                    "dropping undecodable queue event"
                );
                None
            }
        }
    }

    /// Resolve the event's text and dispatch the replies to its sender.
    ///
    /// Returns the send tasks; resolution errors are logged and yield none.
    pub async fn relay(&self, event: InboundEvent) -> Vec<JoinHandle<()>> {
        let query = IntentQuery::new(&self.session_path, event.text(), &self.language_code);

        match self.resolver.resolve(&query).await {
            Ok(responses) => self.dispatcher.dispatch(event.sender_id(), &responses),
            Err(e) => {
                error!(
                    resolver = self.resolver.name(),
                    sender = %event.sender_id(),
                    error = %e,
                    "intent detection failed"
                );
                Vec::new()
            }
        }
    }
}

impl EventHandler for RelayHandler {
    fn on_message(&self, message: &ReceivedMessage) {
        let Some(event) = Self::decode(message) else {
            return;
        };
        let this = self.clone();
        tokio::spawn(async move {
            this.relay(event).await;
        });
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::listener::tests::{message, ChannelSource};
    use crate::listener::{ListenerHandle, ListenerSettings};
    use async_trait::async_trait;
    use base64::{engine::general_purpose::STANDARD, Engine};
    use parley_core::config::TextLinePolicy;
    use parley_core::types::{FulfillmentMessage, IntentResponse, OutboundPayload, SenderId};
    use parley_gcp::resolver::ResolveError;
    use parley_messenger::error::SendError;
    use parley_messenger::send::OutboundSender;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::sync::mpsc;
    use tokio::time::timeout;

    const SESSION: &str = "projects/agent/agent/sessions/mySession1";

    /// Answers every query with one text line echoing it, plus a quick reply.
    /// Reports each query it sees.
    pub(crate) struct EchoResolver {
        pub(crate) seen: mpsc::UnboundedSender<IntentQuery>,
    }

    #[async_trait]
    impl IntentResolver for EchoResolver {
        fn name(&self) -> &str {
            "echo"
        }

        async fn resolve(&self, query: &IntentQuery) -> Result<Vec<IntentResponse>, ResolveError> {
            let _ = self.seen.send(query.clone());
            Ok(vec![IntentResponse {
                messages: vec![
                    FulfillmentMessage::QuickReplies {
                        title: "More?".into(),
                        options: vec!["Yes".into()],
                    },
                    FulfillmentMessage::Text {
                        lines: vec![format!("you said {}", query.text)],
                    },
                ],
                ..Default::default()
            }])
        }
    }

    pub(crate) struct FailingResolver {
        pub(crate) seen: mpsc::UnboundedSender<IntentQuery>,
    }

    #[async_trait]
    impl IntentResolver for FailingResolver {
        fn name(&self) -> &str {
            "failing"
        }

        async fn resolve(&self, query: &IntentQuery) -> Result<Vec<IntentResponse>, ResolveError> {
            let _ = self.seen.send(query.clone());
            Err(ResolveError::Api {
                status: 503,
                message: "backend unavailable".into(),
            })
        }
    }

    #[derive(Default)]
    pub(crate) struct Recording {
        pub(crate) sent: Mutex<Vec<OutboundPayload>>,
    }

    #[async_trait]
    impl OutboundSender for Recording {
        async fn send(&self, payload: &OutboundPayload) -> Result<(), SendError> {
            self.sent.lock().unwrap().push(payload.clone());
            Ok(())
        }
    }

    fn handler(resolver: Arc<dyn IntentResolver>, sender: Arc<Recording>) -> RelayHandler {
        RelayHandler::new(
            resolver,
            Dispatcher::new(sender, TextLinePolicy::LastWins),
            SESSION.to_string(),
            "en".to_string(),
        )
    }

    fn event(sender: &str, text: &str) -> InboundEvent {
        InboundEvent::decode(
            serde_json::json!({"sender": {"id": sender}, "message": {"text": text}})
                .to_string()
                .as_bytes(),
        )
        .unwrap()
    }

    fn encoded(sender: &str, text: &str) -> String {
        STANDARD.encode(
            serde_json::json!({"sender": {"id": sender}, "message": {"text": text}}).to_string(),
        )
    }

    const WAIT: Duration = Duration::from_secs(2);

    #[tokio::test]
    async fn relay_builds_query_and_replies_to_sender() {
        let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();
        let sender = Arc::new(Recording::default());
        let relay = handler(Arc::new(EchoResolver { seen: seen_tx }), sender.clone());

        for h in relay.relay(event("psid-7", "hello")).await {
            h.await.unwrap();
        }

        let query = seen_rx.recv().await.unwrap();
        assert_eq!(query.session_path, SESSION);
        assert_eq!(query.text, "hello");
        assert_eq!(query.language_code, "en");

        let sent = sender.sent.lock().unwrap();
        assert_eq!(sent.len(), 2);
        assert!(sent.iter().all(|p| p.recipient.id == SenderId::from("psid-7")));
        assert!(sent
            .iter()
            .any(|p| p.message.text.as_deref() == Some("you said hello")));
    }

    #[tokio::test]
    async fn resolver_failure_sends_nothing() {
        let (seen_tx, _seen_rx) = mpsc::unbounded_channel();
        let sender = Arc::new(Recording::default());
        let relay = handler(Arc::new(FailingResolver { seen: seen_tx }), sender.clone());

        let handles = relay.relay(event("psid-7", "hello")).await;
        assert!(handles.is_empty());
        assert!(sender.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn resolver_failure_still_acknowledges_the_event() {
        let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();
        let sender = Arc::new(Recording::default());
        let (source, feed) = ChannelSource::new();
        let listener = ListenerHandle::new(
            source.clone(),
            Arc::new(handler(
                Arc::new(FailingResolver { seen: seen_tx }),
                sender.clone(),
            )),
            ListenerSettings {
                max_messages: 10,
                error_pause: Duration::from_millis(10),
            },
        );
        listener.attach().await;

        feed.send(Ok(message("m1", &encoded("psid-1", "hi")))).unwrap();
        let query = timeout(WAIT, seen_rx.recv()).await.unwrap().unwrap();
        assert_eq!(query.text, "hi");

        listener.detach().await;
        assert_eq!(*source.acked.lock().unwrap(), vec!["ack-m1".to_string()]);
        assert!(sender.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn undecodable_events_are_acknowledged_without_resolving() {
        let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();
        let (source, feed) = ChannelSource::new();
        let listener = ListenerHandle::new(
            source.clone(),
            Arc::new(handler(
                Arc::new(EchoResolver { seen: seen_tx }),
                Arc::new(Recording::default()),
            )),
            ListenerSettings {
                max_messages: 10,
                error_pause: Duration::from_millis(10),
            },
        );
        listener.attach().await;

        feed.send(Ok(message("bad-json", &STANDARD.encode("not json"))))
            .unwrap();
        feed.send(Ok(message("bad-b64", "%%%"))).unwrap();
        feed.send(Ok(message("good", &encoded("psid-1", "ok")))).unwrap();

        // only the well-formed event reaches the resolver
        let query = timeout(WAIT, seen_rx.recv()).await.unwrap().unwrap();
        assert_eq!(query.text, "ok");

        listener.detach().await;
        assert!(seen_rx.try_recv().is_err());
        assert_eq!(
            *source.acked.lock().unwrap(),
            vec![
                "ack-bad-json".to_string(),
                "ack-bad-b64".to_string(),
                "ack-good".to_string()
            ]
        );
    }
}
