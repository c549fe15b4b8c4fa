// Activity Application Layer

pub mod aggregator;
pub mod error;
pub mod metrics;
pub mod ops;
pub mod queries;
pub mod retry;
pub mod state;

pub use aggregator::{ActivityFeedAggregator, FeedHandle, FeedSettings, WatchState, WatchStatus};
pub use error::{AppError, FeedError};
pub use metrics::Metrics;
pub use ops::FeedUpdate;
pub use retry::RetryPolicy;
pub use state::AppState;
