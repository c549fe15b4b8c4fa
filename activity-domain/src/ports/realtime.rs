use std::sync::Arc;

use async_trait::async_trait;

use crate::entities::RawRecord;
use crate::value_objects::{ResourceWatch, SubscriptionId};

/// Invoked by the realtime client for every matching row change.
/// Implementations must return quickly; the transport thread calls it inline.
pub type InsertCallback = Arc<dyn Fn(RawRecord) + Send + Sync>;

#[async_trait]
pub trait RealtimeClient: Send + Sync {
    async fn subscribe(
        &self,
        watch: &ResourceWatch,
        callback: InsertCallback,
    ) -> anyhow::Result<SubscriptionId>;

    /// Unknown or already released ids are ignored.
    async fn unsubscribe(&self, id: SubscriptionId) -> anyhow::Result<()>;

    fn is_connected(&self) -> bool;
}
