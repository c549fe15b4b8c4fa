use async_trait::async_trait;

use crate::entities::ActivityItem;

#[async_trait]
pub trait SeedSource: Send + Sync {
    /// Returns at most `limit` items, newest first.
    async fn load(&self, limit: usize) -> anyhow::Result<Vec<ActivityItem>>;

    fn describe(&self) -> String;
}

/// In-memory seed, e.g. handed over by an embedding host.
#[derive(Debug, Clone, Default)]
pub struct StaticSeedSource {
    items: Vec<ActivityItem>,
}

impl StaticSeedSource {
    pub fn new(items: Vec<ActivityItem>) -> Self {
        Self { items }
    }
}

#[async_trait]
impl SeedSource for StaticSeedSource {
    async fn load(&self, limit: usize) -> anyhow::Result<Vec<ActivityItem>> {
        Ok(self.items.iter().take(limit).cloned().collect())
    }

    fn describe(&self) -> String {
        format!("static ({} items)", self.items.len())
    }
}
