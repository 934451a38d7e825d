//! Delivery boundary for story events.

use glimpse_types::events::StoryEvent;
use tokio::sync::broadcast;
use tracing::info;

pub trait NotificationSink: Send + Sync {
    fn notify(&self, event: StoryEvent);
}

/// Fans events out to any number of subscribers. Events sent with no
/// subscriber attached are dropped.
#[derive(Clone)]
pub struct BroadcastSink {
    tx: broadcast::Sender<StoryEvent>,
}

impl BroadcastSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoryEvent> {
        self.tx.subscribe()
    }
}

impl Default for BroadcastSink {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl NotificationSink for BroadcastSink {
    fn notify(&self, event: StoryEvent) {
        let _ = self.tx.send(event);
    }
}

/// Logs every event. Used when nothing downstream consumes notifications.
pub struct TracingSink;

impl NotificationSink for TracingSink {
    fn notify(&self, event: StoryEvent) {
        info!(recipient = ?event.recipient(), "Story event: {:?}", event);
    }
}
