//! Matcher error types.

use hostpool_core::ErrorCode;
use hostpool_placement::PlacementError;
use hostpool_state::StateError;
use thiserror::Error;

/// Errors that can occur while matching or reserving hosts.
#[derive(Debug, Error)]
pub enum MatchError {
    #[error(transparent)]
    Placement(#[from] PlacementError),

    #[error("reservation lost: {held} of {wanted} hosts could be held")]
    ReservationLost { wanted: usize, held: usize },

    #[error("reservation {0} holds no hosts")]
    UnknownReservation(String),

    #[error("state store error: {0}")]
    State(#[from] StateError),
}

impl MatchError {
    pub fn code(&self) -> ErrorCode {
        match self {
            MatchError::Placement(e) => e.code(),
            MatchError::ReservationLost { .. } | MatchError::UnknownReservation(_) => {
                ErrorCode::ReservationLost
            }
            MatchError::State(e) => e.code(),
        }
    }
}

pub type MatchResult<T> = Result<T, MatchError>;
