use async_trait::async_trait;

#[async_trait]
pub trait HealthCheckService: Send + Sync {
    async fn check_realtime(&self) -> anyhow::Result<bool>;
    async fn check_feed(&self) -> anyhow::Result<bool>;
}
