//! Sync error types.

use hostpool_core::ErrorCode;
use hostpool_state::StateError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("state store error: {0}")]
    State(#[from] StateError),
}

impl SyncError {
    pub fn code(&self) -> ErrorCode {
        match self {
            SyncError::State(e) => e.code(),
        }
    }
}

pub type SyncResult<T> = Result<T, SyncError>;
