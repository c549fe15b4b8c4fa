use axum::Router;

use activity_application::AppState;

use crate::handlers::{activity_handlers, ops_handlers};

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route(
            "/v1/activity",
            axum::routing::get(activity_handlers::list_activity),
        )
        .route(
            "/v1/activity/stream",
            axum::routing::get(activity_handlers::stream_activity),
        )
        .route(
            "/v1/activity/watches",
            axum::routing::get(activity_handlers::list_watches),
        )
        .route(
            "/v1/ops/health/live",
            axum::routing::get(ops_handlers::health_live),
        )
        .route(
            "/v1/ops/health/ready",
            axum::routing::get(ops_handlers::health_ready),
        )
        .route(
            "/v1/ops/metrics/prometheus",
            axum::routing::get(ops_handlers::metrics_prometheus),
        )
        .with_state(state)
}
