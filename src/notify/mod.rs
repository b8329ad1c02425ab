//! Best-effort fan-out of committed tree changes.
//!
//! Notifications run after the store transaction has committed, on a
//! detached task with its own deadline. Delivery is at most once: failures
//! and timeouts are logged and dropped, never reported to the caller.

mod content;
mod events;
mod realtime;

pub use content::{ContentSync, HttpContentSync, NoopContentSync};
pub use events::{ContentSyncUpdate, Notification, PathUpdate, RoomMessage, TreeEvent, UpdateType};
pub use realtime::{BroadcastBus, RealtimeBus};

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::task::JoinHandle;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("content sync responded with status {0}")]
    Status(u16),
}

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone)]
pub struct Notifier {
    bus: Arc<dyn RealtimeBus>,
    content: Arc<dyn ContentSync>,
    timeout: Duration,
}

impl Notifier {
    pub fn new(bus: Arc<dyn RealtimeBus>, content: Arc<dyn ContentSync>, timeout: Duration) -> Self {
        Self {
            bus,
            content,
            timeout,
        }
    }

    /// Publishes `notification` in the background. The returned handle only
    /// matters to callers that want to wait for delivery, such as tests.
    /// Outside a tokio runtime the notification is dropped.
    pub fn dispatch(&self, notification: Notification) -> Option<JoinHandle<()>> {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(project_id = %notification.project_id, "no runtime, dropping tree notification");
            return None;
        };

        let bus = Arc::clone(&self.bus);
        let content = Arc::clone(&self.content);
        let timeout = self.timeout;

        Some(runtime.spawn(async move {
            let project_id = notification.project_id.clone();
            let delivery = deliver(bus.as_ref(), content.as_ref(), notification);

            if tokio::time::timeout(timeout, delivery).await.is_err() {
                tracing::warn!(%project_id, ?timeout, "tree notification timed out");
            }
        }))
    }
}

async fn deliver(bus: &dyn RealtimeBus, content: &dyn ContentSync, notification: Notification) {
    let Notification {
        project_id,
        events,
        content: update,
    } = notification;

    if let Some(update) = update {
        if let Err(e) = content.update_tree(&update).await {
            tracing::warn!(%project_id, version = update.version, "content sync update failed: {e}");
        }
    }

    for event in events {
        let message = RoomMessage {
            room: project_id.clone(),
            message: event,
        };
        if let Err(e) = bus.publish(message).await {
            tracing::warn!(%project_id, "real-time publish failed: {e}");
        }
    }
}
