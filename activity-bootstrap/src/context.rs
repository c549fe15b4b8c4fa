use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use activity_application::{ActivityFeedAggregator, AppState, FeedSettings, Metrics};
use activity_domain::{ActivityMapper, RealtimeClient, SeedMode, SeedSource, StaticSeedSource};
use activity_infrastructure::{
    AppConfig, DefaultHealthService, FileSeedSource, PhoenixRealtimeClient, RestSeedSource,
};

pub struct AppContext {
    pub state: AppState,
    realtime: Arc<PhoenixRealtimeClient>,
}

impl AppContext {
    pub async fn new(config: AppConfig) -> Result<Self> {
        let realtime = Arc::new(PhoenixRealtimeClient::connect(config.to_backend_config()));
        Self::with_client(config, realtime).await
    }

    /// Builds the context around an already connecting client. The client is
    /// shut down if the feed cannot be started.
    pub async fn with_client(
        config: AppConfig,
        realtime: Arc<PhoenixRealtimeClient>,
    ) -> Result<Self> {
        let runtime_config = config.to_runtime_config();
        let backend_config = config.to_backend_config();
        let mapper = Arc::new(ActivityMapper::default());
        let metrics = Arc::new(Metrics::default());

        let seed: Box<dyn SeedSource> = match runtime_config.seed_mode {
            SeedMode::File => Box::new(FileSeedSource::new(&runtime_config.seed_path)),
            SeedMode::Rest => match RestSeedSource::new(
                &backend_config,
                runtime_config.watches.clone(),
                mapper.clone(),
                runtime_config.request_timeout_seconds,
            ) {
                Ok(source) => Box::new(source),
                Err(err) => {
                    realtime.shutdown().await;
                    return Err(err);
                }
            },
            SeedMode::None => Box::new(StaticSeedSource::new(Vec::new())),
        };

        let aggregator = ActivityFeedAggregator::new(
            realtime.clone(),
            mapper,
            FeedSettings::from(&runtime_config),
            metrics.clone(),
        );
        let feed = match aggregator
            .start_with_source(seed.as_ref(), runtime_config.watches.clone())
            .await
        {
            Ok(feed) => Arc::new(feed),
            Err(err) => {
                realtime.shutdown().await;
                return Err(err.into());
            }
        };

        let realtime_port: Arc<dyn RealtimeClient> = realtime.clone();
        let state = AppState {
            config: runtime_config,
            feed: feed.clone(),
            health: Arc::new(DefaultHealthService::new(realtime_port, feed)),
            metrics,
        };

        Ok(Self { state, realtime })
    }

    /// Releases every watch, then closes the realtime socket.
    pub async fn shutdown(&self) {
        self.state.feed.stop().await;
        self.realtime.shutdown().await;
        info!("activity feed context shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use activity_infrastructure::WatchEntry;

    fn offline_config(tables: &[&str]) -> AppConfig {
        AppConfig {
            realtime_url: "ws://127.0.0.1:9/realtime/v1".to_string(),
            watches: tables
                .iter()
                .map(|table| WatchEntry {
                    schema: "public".to_string(),
                    table: table.to_string(),
                })
                .collect(),
            ..AppConfig::default()
        }
    }

    #[tokio::test]
    async fn failed_start_closes_the_realtime_client() {
        let config = offline_config(&["orders", "chat_messages"]);
        let realtime = Arc::new(PhoenixRealtimeClient::connect(config.to_backend_config()));
        let result = AppContext::with_client(config, realtime.clone()).await;
        assert!(result.is_err());
        assert!(realtime.is_shut_down());
    }

    #[tokio::test]
    async fn context_serves_an_empty_feed_without_seed() {
        let config = offline_config(&["orders"]);
        let realtime = Arc::new(PhoenixRealtimeClient::connect(config.to_backend_config()));
        let context = AppContext::with_client(config, realtime.clone())
            .await
            .expect("context");
        assert!(context.state.feed.is_running());
        assert!(context.state.feed.snapshot().await.is_empty());
        context.shutdown().await;
        assert!(!context.state.feed.is_running());
        assert!(realtime.is_shut_down());
    }
}
