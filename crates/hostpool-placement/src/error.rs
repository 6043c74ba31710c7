//! Errors raised while filtering and picking.

use hostpool_core::ErrorCode;
use hostpool_state::StateError;
use thiserror::Error;

pub type PlacementResult<T> = Result<T, PlacementError>;

#[derive(Debug, Error)]
pub enum PlacementError {
    #[error("invalid request: {0}")]
    Validation(String),

    #[error("no unused host matches the request")]
    NoCandidates,

    #[error("only {found} of {wanted} requested hosts match")]
    TooFewCandidates { found: usize, wanted: usize },

    #[error("affinity unsatisfied: {0}")]
    AffinityUnsatisfied(String),

    #[error("cross-switch candidates exhausted: {0}")]
    CrossSwitchExhausted(String),

    #[error(transparent)]
    State(#[from] StateError),
}

impl PlacementError {
    pub fn code(&self) -> ErrorCode {
        match self {
            PlacementError::Validation(_) => ErrorCode::ValidationError,
            PlacementError::NoCandidates => ErrorCode::NoCandidates,
            PlacementError::TooFewCandidates { .. } => ErrorCode::TooFewCandidates,
            PlacementError::AffinityUnsatisfied(_) => ErrorCode::AffinityUnsatisfied,
            PlacementError::CrossSwitchExhausted(_) => ErrorCode::CrossSwitchExhausted,
            PlacementError::State(e) => e.code(),
        }
    }
}
