use async_trait::async_trait;
use tokio::sync::broadcast;

use super::NotifyError;
use super::events::RoomMessage;

/// Fan-out of room-scoped messages to connected editors. Consumers must
/// tolerate missing or duplicated messages.
#[async_trait]
pub trait RealtimeBus: Send + Sync {
    async fn publish(&self, message: RoomMessage) -> Result<(), NotifyError>;
}

/// In-process bus over a tokio broadcast channel.
#[derive(Clone)]
pub struct BroadcastBus {
    tx: broadcast::Sender<RoomMessage>,
}

impl BroadcastBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RoomMessage> {
        self.tx.subscribe()
    }
}

impl Default for BroadcastBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[async_trait]
impl RealtimeBus for BroadcastBus {
    async fn publish(&self, message: RoomMessage) -> Result<(), NotifyError> {
        match self.tx.send(message) {
            Ok(subscribers) => {
                tracing::debug!(subscribers, "published room message");
            }
            Err(_) => {
                // No subscribers, nothing to deliver.
                tracing::debug!("no subscribers for room message");
            }
        }
        Ok(())
    }
}
