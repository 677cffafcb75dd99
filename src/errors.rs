//! Error types for the resource pool

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    #[error("Failed to create resource: {0}")]
    CreationFailed(String),

    #[error("No resource available - pool is at its ceiling")]
    ResourceUnavailable,

    #[error("Failed to reset resource: {0}")]
    ResetFailed(String),

    #[error("Resource is not checked out from this pool")]
    UnknownResource,

    #[error("Invalid pool configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Failed to export metrics: {0}")]
    MetricsExport(String),
}

pub type PoolResult<T> = Result<T, PoolError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_carry_factory_detail() {
        let err = PoolError::ResetFailed("socket closed".to_string());
        assert_eq!(err.to_string(), "Failed to reset resource: socket closed");

        let err = PoolError::CreationFailed("refused".to_string());
        assert!(err.to_string().ends_with("refused"));
    }
}
