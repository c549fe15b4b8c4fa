use activity_domain::ActivityItem;
use serde::Serialize;
use tokio::sync::broadcast;

const CHANNEL_BUFFER: usize = 64;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FeedUpdate {
    Insert {
        item: ActivityItem,
        #[serde(skip_serializing_if = "Option::is_none")]
        evicted: Option<String>,
    },
    Stopped,
}

/// Fan-out of applied feed changes to live viewers.
pub struct FeedStreamHub {
    tx: broadcast::Sender<FeedUpdate>,
}

impl Default for FeedStreamHub {
    fn default() -> Self {
        let (tx, _rx) = broadcast::channel(CHANNEL_BUFFER);
        Self { tx }
    }
}

impl FeedStreamHub {
    pub fn subscribe(&self) -> broadcast::Receiver<FeedUpdate> {
        self.tx.subscribe()
    }

    pub fn publish(&self, update: FeedUpdate) {
        let _ = self.tx.send(update);
    }

    pub fn viewer_count(&self) -> usize {
        self.tx.receiver_count()
    }
}
