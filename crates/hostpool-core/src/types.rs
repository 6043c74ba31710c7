//! Shared types used across hostpool crates.

use serde::{Deserialize, Serialize};

/// Error code returned to callers. Every named failure in the matcher,
/// the loader, and the store maps onto exactly one code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    ValidationError,
    DuplicateHost,
    HostNotFound,
    NoCandidates,
    TooFewCandidates,
    AffinityUnsatisfied,
    CrossSwitchExhausted,
    ReservationLost,
    ExternalCatalogError,
    SystemError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ValidationError => "VALIDATION_ERROR",
            ErrorCode::DuplicateHost => "DUPLICATE_HOST",
            ErrorCode::HostNotFound => "HOST_NOT_FOUND",
            ErrorCode::NoCandidates => "NO_CANDIDATES",
            ErrorCode::TooFewCandidates => "TOO_FEW_CANDIDATES",
            ErrorCode::AffinityUnsatisfied => "AFFINITY_UNSATISFIED",
            ErrorCode::CrossSwitchExhausted => "CROSS_SWITCH_EXHAUSTED",
            ErrorCode::ReservationLost => "RESERVATION_LOST",
            ErrorCode::ExternalCatalogError => "EXTERNAL_CATALOG_ERROR",
            ErrorCode::SystemError => "SYSTEM_ERROR",
        }
    }

    /// Whether the caller can fix the failure by changing the request.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ErrorCode::ValidationError | ErrorCode::DuplicateHost | ErrorCode::HostNotFound
        )
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured error body: `{ "code": ..., "message": ... }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: ErrorCode,
    pub message: String,
}

impl ErrorBody {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serde_name_matches_as_str() {
        for code in [
            ErrorCode::ValidationError,
            ErrorCode::DuplicateHost,
            ErrorCode::HostNotFound,
            ErrorCode::NoCandidates,
            ErrorCode::TooFewCandidates,
            ErrorCode::AffinityUnsatisfied,
            ErrorCode::CrossSwitchExhausted,
            ErrorCode::ReservationLost,
            ErrorCode::ExternalCatalogError,
            ErrorCode::SystemError,
        ] {
            let json = serde_json::to_string(&code).unwrap();
            assert_eq!(json, format!("\"{}\"", code.as_str()));
        }
    }

    #[test]
    fn error_body_shape() {
        let body = ErrorBody::new(ErrorCode::NoCandidates, "nothing matched");
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["code"], "NO_CANDIDATES");
        assert_eq!(value["message"], "nothing matched");
    }

    #[test]
    fn client_errors() {
        assert!(ErrorCode::ValidationError.is_client_error());
        assert!(!ErrorCode::ReservationLost.is_client_error());
        assert!(!ErrorCode::SystemError.is_client_error());
    }
}
