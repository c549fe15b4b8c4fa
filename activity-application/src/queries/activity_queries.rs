use serde::Deserialize;

use crate::aggregator::WatchState;
use crate::{AppError, AppState};
use activity_domain::ActivityItem;

#[derive(Debug, Default, Deserialize)]
pub struct ActivityQuery {
    pub limit: Option<usize>,
}

pub async fn list_activity(
    state: &AppState,
    query: ActivityQuery,
) -> Result<Vec<ActivityItem>, AppError> {
    let mut items = state.feed.snapshot().await;
    if let Some(limit) = query.limit {
        if limit == 0 {
            return Err(AppError::BadRequest("limit must be > 0".to_string()));
        }
        items.truncate(limit);
    }
    Ok(items)
}

pub async fn list_watches(state: &AppState) -> Vec<WatchState> {
    state.feed.watches().await
}
