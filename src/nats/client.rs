use anyhow::{Context, Result};
use async_nats::Client;
use tokio::sync::mpsc;
use tracing::{error, info};

use super::messages::AnnouncementMessage;

/// Publishes room announcements to NATS.
///
/// `publish` only queues the message; a background task owns the
/// connection, so callers on the packet path never wait on the network.
#[derive(Clone)]
pub struct NatsAnnouncer {
    tx: mpsc::UnboundedSender<AnnouncementMessage>,
}

impl NatsAnnouncer {
    /// Connect to NATS server and start the publishing task
    pub async fn connect(url: &str) -> Result<Self> {
        info!("Connecting to NATS at {}", url);

        let client = async_nats::connect(url)
            .await
            .context("Failed to connect to NATS")?;

        info!("Connected to NATS successfully");

        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(publish_loop(client, rx));

        Ok(Self { tx })
    }

    /// Queue an announcement. Returns false once the publishing task is gone.
    pub fn publish(&self, message: AnnouncementMessage) -> bool {
        self.tx.send(message).is_ok()
    }
}

async fn publish_loop(client: Client, mut rx: mpsc::UnboundedReceiver<AnnouncementMessage>) {
    while let Some(message) = rx.recv().await {
        let subject = message.subject();
        let payload = match serde_json::to_vec(&message) {
            Ok(payload) => payload,
            Err(e) => {
                error!("Failed to encode announcement: {}", e);
                continue;
            }
        };

        if let Err(e) = client.publish(subject.clone(), payload.into()).await {
            error!("Failed to publish announcement to {}: {}", subject, e);
        }
    }

    if let Err(e) = client.flush().await {
        error!("Failed to flush NATS connection: {}", e);
    }
    info!("NATS announcement publisher stopped");
}
