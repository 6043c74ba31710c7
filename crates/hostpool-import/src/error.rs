//! Import error types.

use hostpool_core::ErrorCode;
use hostpool_state::StateError;
use thiserror::Error;

use crate::provider::ProviderError;

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("invalid import request: {0}")]
    Validation(String),

    #[error("duplicate host: {0}")]
    Duplicate(String),

    #[error("{source_name} failed after {attempts} attempts: {error}")]
    ExternalCatalog {
        source_name: &'static str,
        attempts: u32,
        error: ProviderError,
    },

    #[error("state store error: {0}")]
    State(#[from] StateError),
}

impl ImportError {
    pub fn code(&self) -> ErrorCode {
        match self {
            ImportError::Validation(_) => ErrorCode::ValidationError,
            ImportError::Duplicate(_) => ErrorCode::DuplicateHost,
            ImportError::ExternalCatalog { .. } => ErrorCode::ExternalCatalogError,
            ImportError::State(e) => e.code(),
        }
    }
}

pub type ImportResult<T> = Result<T, ImportError>;
