use activity_domain::MappingError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("unauthorized")]
    Unauthorized,
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// Failures inside the live feed. None of them is fatal to the host.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("no mapping for watched resource '{0}'")]
    UnmappedResource(String),
    #[error("subscription to '{resource}' failed: {reason}")]
    Subscription { resource: String, reason: String },
    #[error(transparent)]
    Mapping(#[from] MappingError),
    #[error("seed load failed: {0}")]
    SeedLoad(String),
}

impl From<FeedError> for AppError {
    fn from(value: FeedError) -> Self {
        match value {
            FeedError::UnmappedResource(_) => AppError::BadRequest(value.to_string()),
            other => AppError::Internal(anyhow::Error::new(other)),
        }
    }
}
