use std::sync::Arc;

use activity_domain::ports::HealthCheckService;
use activity_domain::RuntimeConfig;

use crate::aggregator::FeedHandle;
use crate::Metrics;

#[derive(Clone)]
pub struct AppState {
    pub config: RuntimeConfig,
    pub feed: Arc<FeedHandle>,
    pub health: Arc<dyn HealthCheckService>,
    pub metrics: Arc<Metrics>,
}
