use anyhow::Result;
use futures::StreamExt;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::client::NatsClient;
use super::messages::{ControlCommand, EventMessage};
use crate::recognizer::{
    EventHub, Recognizer, RecognizerFactory, RecognizerOptions, Subscription,
};

/// Recognizer backed by an external STT service over NATS
///
/// Commands are request/reply on `stt.control.<session_id>`; events arrive on
/// `stt.event.<session_id>` and are forwarded to the session's subscription.
pub struct NatsRecognizer {
    client: NatsClient,
    hub: EventHub,
    event_task: Mutex<Option<JoinHandle<()>>>,
}

impl NatsRecognizer {
    pub async fn connect(url: &str, session_id: &str) -> Result<Self> {
        let client = NatsClient::connect(url, session_id.to_string()).await?;
        let subscriber = client.subscribe_events().await?;

        let hub = EventHub::new();
        let event_task = tokio::spawn(forward_events(
            subscriber,
            session_id.to_string(),
            hub.clone(),
        ));

        Ok(Self {
            client,
            hub,
            event_task: Mutex::new(Some(event_task)),
        })
    }
}

impl Drop for NatsRecognizer {
    fn drop(&mut self) {
        if let Some(task) = self.event_task.lock().take() {
            task.abort();
        }
    }
}

#[async_trait::async_trait]
impl Recognizer for NatsRecognizer {
    async fn start(&self, locale: &str, options: &RecognizerOptions) -> Result<()> {
        self.client
            .send_command(ControlCommand::Start {
                locale: locale.to_string(),
                options: options.clone(),
            })
            .await
    }

    async fn stop(&self) -> Result<()> {
        self.client.send_command(ControlCommand::Stop).await
    }

    async fn cancel(&self) -> Result<()> {
        self.client.send_command(ControlCommand::Cancel).await
    }

    fn subscribe(&self) -> Subscription {
        self.hub.subscribe()
    }

    fn name(&self) -> &str {
        "nats"
    }
}

async fn forward_events(mut subscriber: async_nats::Subscriber, session_id: String, hub: EventHub) {
    while let Some(msg) = subscriber.next().await {
        let message: EventMessage = match serde_json::from_slice(&msg.payload) {
            Ok(message) => message,
            Err(e) => {
                warn!("Failed to parse recognizer event: {}", e);
                continue;
            }
        };

        if message.session_id != session_id {
            debug!("Skipping event for session {}", message.session_id);
            continue;
        }

        debug!("Received {} event for {}", message.event.kind(), session_id);
        hub.emit(message.event);
    }

    info!("Recognizer event stream for {} closed", session_id);
}

/// Connects a new [`NatsRecognizer`] for every session
pub struct NatsRecognizerFactory {
    url: String,
}

impl NatsRecognizerFactory {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait::async_trait]
impl RecognizerFactory for NatsRecognizerFactory {
    async fn create(&self, session_id: &str) -> Result<Arc<dyn Recognizer>> {
        let recognizer = NatsRecognizer::connect(&self.url, session_id).await?;
        Ok(Arc::new(recognizer))
    }
}
