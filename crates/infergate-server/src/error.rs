//! HTTP error mapping for core errors.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use infergate_core::Error;
use serde::Serialize;
use tracing::error;

/// Core error carried out of a handler
#[derive(Debug)]
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    code: &'static str,
}

impl ApiError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match &self.0 {
            Error::Unauthenticated => (StatusCode::UNAUTHORIZED, "UNAUTHENTICATED"),
            Error::GenerationFailed(_) => (StatusCode::BAD_GATEWAY, "GENERATION_FAILED"),
            Error::StorageUnavailable(_) | Error::LockPoisoned => {
                (StatusCode::SERVICE_UNAVAILABLE, "STORAGE_UNAVAILABLE")
            }
            Error::DuplicateCommandId { .. } => (StatusCode::CONFLICT, "DUPLICATE_COMMAND_ID"),
            Error::Serialization(_) => (StatusCode::INTERNAL_SERVER_ERROR, "SERIALIZATION"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        if status.is_server_error() {
            error!(code, error = %self.0, "Request failed");
        }

        let body = Json(ErrorBody {
            error: self.0.to_string(),
            code,
        });
        (status, body).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn status_of(err: Error) -> StatusCode {
        ApiError(err).into_response().status()
    }

    #[test]
    fn test_error_status_mapping() {
        assert_eq!(status_of(Error::Unauthenticated), StatusCode::UNAUTHORIZED);
        assert_eq!(status_of(Error::generation("down")), StatusCode::BAD_GATEWAY);
        assert_eq!(
            status_of(Error::StorageUnavailable("disk".into())),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(status_of(Error::LockPoisoned), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(status_of(Error::duplicate_command("cmd_1")), StatusCode::CONFLICT);
    }
}
