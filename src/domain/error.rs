//! Domain errors

use thiserror::Error;

/// Domain-level error types
#[derive(Debug, Clone, Error)]
pub enum DomainError {
    #[error("Evse not found: {0}")]
    EvseNotFound(i32),

    #[error("Charging profile not found: {0}")]
    ProfileNotFound(i32),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("{0}")]
    Other(String),
}

/// Result type for domain operations
pub type DomainResult<T> = Result<T, DomainError>;
