use thiserror::Error;

/// A record that could not be turned into an activity item.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MappingError {
    #[error("no mapping registered for resource '{0}'")]
    UnknownResource(String),
    #[error("record for '{resource}' is missing required field '{field}'")]
    MissingField { resource: String, field: String },
    #[error("record for '{resource}' has an unusable value in field '{field}'")]
    InvalidField { resource: String, field: String },
}
