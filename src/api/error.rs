use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;

use crate::rotation::RotationError;

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Unauthorized(String),
    Forbidden(&'static str, String),
    NotFound(String),
    Gone(String),
    ServiceUnavailable(&'static str, String),
    Internal(String),
    /// Engine outcome mapped with its own kind code
    Rotation(StatusCode, &'static str, String),
}

impl ApiError {
    pub fn bad_request<S: Into<String>>(msg: S) -> Self {
        ApiError::BadRequest(msg.into())
    }

    pub fn unauthorized<S: Into<String>>(msg: S) -> Self {
        ApiError::Unauthorized(msg.into())
    }

    fn parts(self) -> (StatusCode, &'static str, String) {
        match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "unauthorized", msg),
            ApiError::Forbidden(kind, msg) => (StatusCode::FORBIDDEN, kind, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg),
            ApiError::Gone(msg) => (StatusCode::GONE, "link_expired", msg),
            ApiError::ServiceUnavailable(kind, msg) => (StatusCode::SERVICE_UNAVAILABLE, kind, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", msg),
            ApiError::Rotation(status, kind, msg) => (status, kind, msg),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    response: &'static str,
    reason: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, response, reason) = self.parts();
        (status, Json(ErrorBody { response, reason })).into_response()
    }
}

impl From<RotationError> for ApiError {
    fn from(err: RotationError) -> Self {
        let kind = err.kind();
        let reason = err.to_string();
        match err {
            RotationError::NotFound { .. } => ApiError::NotFound(reason),
            RotationError::LinkExpired => ApiError::Gone(reason),
            RotationError::WrongPassword | RotationError::MachineDisabled { .. } => {
                ApiError::Forbidden(kind, reason)
            }
            RotationError::SessionMismatch { .. } | RotationError::InvalidInput { .. } => {
                ApiError::Rotation(StatusCode::BAD_REQUEST, kind, reason)
            }
            RotationError::BudgetExhausted
            | RotationError::BackendUnavailable { .. }
            | RotationError::EncryptionFailed { .. }
            | RotationError::DecryptionFailed { .. }
            | RotationError::SigningFailed { .. }
            | RotationError::StoreUnavailable { .. } => ApiError::ServiceUnavailable(kind, reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_of(err: RotationError) -> StatusCode {
        ApiError::from(err).parts().0
    }

    #[test]
    fn rotation_outcomes_map_to_status_codes() {
        assert_eq!(status_of(RotationError::session_mismatch("x")), StatusCode::BAD_REQUEST);
        assert_eq!(status_of(RotationError::WrongPassword), StatusCode::FORBIDDEN);
        assert_eq!(status_of(RotationError::machine_disabled("m")), StatusCode::FORBIDDEN);
        assert_eq!(status_of(RotationError::not_found("Machine")), StatusCode::NOT_FOUND);
        assert_eq!(status_of(RotationError::LinkExpired), StatusCode::GONE);
        assert_eq!(status_of(RotationError::BudgetExhausted), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            status_of(RotationError::StoreUnavailable { reason: "db".into() }),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn kind_code_is_the_response_field() {
        let (_, kind, reason) = ApiError::from(RotationError::BudgetExhausted).parts();
        assert_eq!(kind, "budget_exhausted");
        assert!(reason.contains("budget"));
    }
}
