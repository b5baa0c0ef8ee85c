use anyhow::{anyhow, Context, Result};
use async_nats::Client;
use std::time::Duration;
use tracing::{debug, info};

use super::messages::{control_subject, event_subject, ControlCommand, ControlMessage, ControlReply};

/// How long to wait for the STT service to answer a command
const COMMAND_TIMEOUT: Duration = Duration::from_secs(10);

pub struct NatsClient {
    client: Client,
    session_id: String,
}

impl NatsClient {
    /// Connect to NATS server
    pub async fn connect(url: &str, session_id: String) -> Result<Self> {
        info!("Connecting to NATS at {}", url);

        let client = async_nats::connect(url)
            .await
            .context("Failed to connect to NATS")?;

        info!("Connected to NATS successfully");

        Ok(Self { client, session_id })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Send a recognizer command and wait for the service's reply
    pub async fn send_command(&self, command: ControlCommand) -> Result<()> {
        let subject = control_subject(&self.session_id);
        let name = command.name();

        let message = ControlMessage {
            session_id: self.session_id.clone(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            command,
        };
        let payload = serde_json::to_vec(&message)?;

        let response = tokio::time::timeout(
            COMMAND_TIMEOUT,
            self.client.request(subject.clone(), payload.into()),
        )
        .await
        .with_context(|| format!("Timed out waiting for {} reply", name))?
        .with_context(|| format!("Failed to send {} command", name))?;

        let reply: ControlReply = serde_json::from_slice(&response.payload)
            .with_context(|| format!("Invalid reply to {} command", name))?;

        debug!("{} command on {} answered: ok={}", name, subject, reply.ok);

        if !reply.ok {
            return Err(anyhow!(reply
                .error
                .unwrap_or_else(|| format!("{} rejected by recognizer", name))));
        }
        Ok(())
    }

    /// Subscribe to this session's recognizer events
    pub async fn subscribe_events(&self) -> Result<async_nats::Subscriber> {
        let subject = event_subject(&self.session_id);

        info!("Subscribing to recognizer events on {}", subject);

        let subscriber = self
            .client
            .subscribe(subject.clone())
            .await
            .context("Failed to subscribe to recognizer events")?;

        Ok(subscriber)
    }
}
