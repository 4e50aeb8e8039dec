//! Queue listener: pulls from the subscription, hands each message to the
//! event handler and acknowledges it right away.
//!
//! The listener can be detached and re-attached at runtime through
//! [`ListenerHandle`]. While detached nothing is pulled, so messages stay
//! pending on the subscription.

use std::sync::Arc;
use std::time::Duration;

use parley_gcp::pubsub::{MessageSource, ReceivedMessage};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Receives every message the listener pulls.
///
/// `on_message` must return quickly: long work belongs in a spawned task.
/// The message is acknowledged as soon as this call returns.
pub trait EventHandler: Send + Sync {
    fn on_message(&self, message: &ReceivedMessage);
}

#[derive(Debug, Clone)]
pub struct ListenerSettings {
    pub max_messages: u32,
    /// Pause after a failed pull.
    pub error_pause: Duration,
}

struct Running {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Attach/detach control over the pull loop.
pub struct ListenerHandle {
    source: Arc<dyn MessageSource>,
    handler: Arc<dyn EventHandler>,
    settings: ListenerSettings,
    running: Mutex<Option<Running>>,
}

impl ListenerHandle {
    /// Create a detached listener.
    pub fn new(
        source: Arc<dyn MessageSource>,
        handler: Arc<dyn EventHandler>,
        settings: ListenerSettings,
    ) -> Self {
        Self {
            source,
            handler,
            settings,
            running: Mutex::new(None),
        }
    }

    /// Start the pull loop. Returns `false` if it was already running.
    pub async fn attach(&self) -> bool {
        let mut running = self.running.lock().await;
        if running.as_ref().is_some_and(|r| !r.task.is_finished()) {
            debug!(source = self.source.name(), "listener already attached");
            return false;
        }

        let cancel = CancellationToken::new();
        let task = tokio::spawn(pull_loop(
            Arc::clone(&self.source),
            Arc::clone(&self.handler),
            self.settings.clone(),
            cancel.clone(),
        ));
        *running = Some(Running { cancel, task });
        true
    }

    /// Stop the pull loop and wait for it to exit.
    /// Returns `false` if it was not running.
    pub async fn detach(&self) -> bool {
        // Lock is released before waiting on the task.
        let Some(r) = self.running.lock().await.take() else {
            debug!(source = self.source.name(), "listener already detached");
            return false;
        };
        r.cancel.cancel();
        if let Err(e) = r.task.await {
            error!(error = %e, "listener task ended abnormally");
        }
        true
    }

    pub async fn is_attached(&self) -> bool {
        self.running
            .lock()
            .await
            .as_ref()
            .is_some_and(|r| !r.task.is_finished())
    }
}

async fn pull_loop(
    source: Arc<dyn MessageSource>,
    handler: Arc<dyn EventHandler>,
    settings: ListenerSettings,
    cancel: CancellationToken,
) {
    info!(source = source.name(), "queue listener attached");

    loop {
        let pulled = tokio::select! {
            _ = cancel.cancelled() => break,
            r = source.pull(settings.max_messages) => r,
        };

        let messages = match pulled {
            Ok(messages) => messages,
            Err(e) => {
                error!(source = source.name(), error = %e, "subscription error");
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(settings.error_pause) => {}
                }
                continue;
            }
        };
        if messages.is_empty() {
            continue;
        }

        // Ack is not gated on the outcome of handling.
        let mut ack_ids = Vec::with_capacity(messages.len());
        for message in &messages {
            handler.on_message(message);
            ack_ids.push(message.ack_id.clone());
        }
        let acked = tokio::select! {
            _ = cancel.cancelled() => {
                warn!(
                    source = source.name(),
                    count = ack_ids.len(),
                    "detached before acknowledge completed, messages will be redelivered"
                );
                break;
            }
            r = source.acknowledge(&ack_ids) => r,
        };
        if let Err(e) = acked {
            error!(
                source = source.name(),
                count = ack_ids.len(),
                error = %e,
                "acknowledge failed, messages will be redelivered"
            );
        }
    }

    info!(source = source.name(), "queue listener detached");
}
