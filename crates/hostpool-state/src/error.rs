//! Error types for the inventory store.

use hostpool_core::ErrorCode;
use thiserror::Error;

/// Result type alias for inventory store operations.
pub type StateResult<T> = Result<T, StateError>;

/// Errors that can occur during inventory store operations.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("failed to open database: {0}")]
    Open(String),

    #[error("transaction error: {0}")]
    Transaction(String),

    #[error("table error: {0}")]
    Table(String),

    #[error("read error: {0}")]
    Read(String),

    #[error("write error: {0}")]
    Write(String),

    #[error("serialization error: {0}")]
    Serialize(String),

    #[error("deserialization error: {0}")]
    Deserialize(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("duplicate host: {0}")]
    Duplicate(String),
}

impl StateError {
    pub fn code(&self) -> ErrorCode {
        match self {
            StateError::NotFound(_) => ErrorCode::HostNotFound,
            StateError::Duplicate(_) => ErrorCode::DuplicateHost,
            _ => ErrorCode::SystemError,
        }
    }
}
