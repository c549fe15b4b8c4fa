use std::sync::Arc;

use async_trait::async_trait;
use activity_application::FeedHandle;
use activity_domain::ports::{HealthCheckService, RealtimeClient};

pub struct DefaultHealthService {
    realtime: Arc<dyn RealtimeClient>,
    feed: Arc<FeedHandle>,
}

impl DefaultHealthService {
    pub fn new(realtime: Arc<dyn RealtimeClient>, feed: Arc<FeedHandle>) -> Self {
        Self { realtime, feed }
    }
}

#[async_trait]
impl HealthCheckService for DefaultHealthService {
    async fn check_realtime(&self) -> anyhow::Result<bool> {
        Ok(self.realtime.is_connected())
    }

    async fn check_feed(&self) -> anyhow::Result<bool> {
        Ok(self.feed.is_running())
    }
}
