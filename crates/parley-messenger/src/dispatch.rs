//! Fan-out of resolved fulfillment messages to the Send API.
//!
//! Plain text replies are sent before quick-reply prompts, whatever their
//! order in the NLU response. Each send runs in its own task and a failed
//! send never holds back the ones after it.

use std::sync::Arc;

use parley_core::config::TextLinePolicy;
use parley_core::types::{FulfillmentMessage, IntentResponse, OutboundPayload, SenderId};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::send::OutboundSender;

/// Which pass produced a payload. Only used for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pass {
    Text,
    Rich,
}

impl Pass {
    fn as_str(self) -> &'static str {
        match self {
            Pass::Text => "text",
            Pass::Rich => "rich",
        }
    }
}

pub struct Dispatcher {
    sender: Arc<dyn OutboundSender>,
    text_lines: TextLinePolicy,
}

impl Dispatcher {
    pub fn new(sender: Arc<dyn OutboundSender>, text_lines: TextLinePolicy) -> Self {
        Self { sender, text_lines }
    }

    /// All payloads for one event, in the order they will be sent.
    pub fn plan(
        &self,
        recipient: &SenderId,
        responses: &[IntentResponse],
    ) -> Vec<OutboundPayload> {
        self.passes(recipient, responses)
            .into_iter()
            .map(|(_, payload)| payload)
            .collect()
    }

    /// Spawn one send task per payload and return without waiting for them.
    ///
    /// Text tasks are spawned before rich tasks. Only spawn order is fixed;
    /// the requests themselves may complete in any order. The handles are
    /// returned for callers that want to wait; dropping them detaches the tasks.
    pub fn dispatch(
        &self,
        recipient: &SenderId,
        responses: &[IntentResponse],
    ) -> Vec<JoinHandle<()>> {
        let planned = self.passes(recipient, responses);
        info!(
            recipient = %recipient,
            text = planned.iter().filter(|(p, _)| *p == Pass::Text).count(),
            rich = planned.iter().filter(|(p, _)| *p == Pass::Rich).count(),
            "dispatching replies"
        );

        planned
            .into_iter()
            .map(|(pass, payload)| self.spawn_send(pass, payload))
            .collect()
    }

    fn passes(
        &self,
        recipient: &SenderId,
        responses: &[IntentResponse],
    ) -> Vec<(Pass, OutboundPayload)> {
        let text = self.text_pass(recipient, responses);
        let rich = rich_pass(recipient, responses);
        text.into_iter()
            .map(|p| (Pass::Text, p))
            .chain(rich.into_iter().map(|p| (Pass::Rich, p)))
            .collect()
    }

    fn spawn_send(&self, pass: Pass, payload: OutboundPayload) -> JoinHandle<()> {
        let sender = Arc::clone(&self.sender);
        tokio::spawn(async move {
            debug!(pass = pass.as_str(), payload = ?payload, "sending message");
            match sender.send(&payload).await {
                Ok(()) => info!(
                    pass = pass.as_str(),
                    recipient = %payload.recipient.id,
                    "message sent"
                ),
                Err(e) => error!(
                    pass = pass.as_str(),
                    recipient = %payload.recipient.id,
                    error = %e,
                    "message send failed"
                ),
            }
        })
    }

    fn text_pass(
        &self,
        recipient: &SenderId,
        responses: &[IntentResponse],
    ) -> Vec<OutboundPayload> {
        let mut out = Vec::new();
        for msg in responses.iter().flat_map(|r| &r.messages) {
            let FulfillmentMessage::Text { lines } = msg else {
                continue;
            };
            match self.text_lines {
                // Each line overwrites the previous text, so only the last survives.
                TextLinePolicy::LastWins => {
                    if let Some(last) = lines.last() {
                        out.push(OutboundPayload::text(recipient, last));
                    }
                }
                TextLinePolicy::OnePerLine => {
                    out.extend(lines.iter().map(|l| OutboundPayload::text(recipient, l)));
                }
            }
        }
        out
    }
}

fn rich_pass(recipient: &SenderId, responses: &[IntentResponse]) -> Vec<OutboundPayload> {
    responses
        .iter()
        .flat_map(|r| &r.messages)
        .filter_map(|msg| match msg {
            FulfillmentMessage::QuickReplies { title, options } => {
                Some(OutboundPayload::quick_replies(recipient, title, options))
            }
            FulfillmentMessage::Text { .. } => None,
            other => {
                debug!(kind = other.kind(), "skipping unsupported fulfillment message");
                None
            }
        })
        .collect()
}
