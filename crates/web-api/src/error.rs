use application::ApplicationError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorBody,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            body: ErrorBody {
                code,
                message: message.into(),
            },
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "BAD_REQUEST", message)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<ApplicationError> for ApiError {
    fn from(error: ApplicationError) -> Self {
        use application::ApplicationError as AppErr;
        use domain::{DomainError, RepositoryError};

        match error {
            AppErr::Domain(DomainError::InvalidArgument { field, reason }) => ApiError::new(
                StatusCode::BAD_REQUEST,
                "INVALID_ARGUMENT",
                format!("{}: {}", field, reason),
            ),
            AppErr::Domain(DomainError::ResourceNotFound {
                resource_type,
                resource_id,
            }) => ApiError::new(
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                format!("{} {} not found", resource_type, resource_id),
            ),
            AppErr::Repository(RepositoryError::NotFound) => ApiError::new(
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                "requested resource not found",
            ),
            AppErr::Repository(RepositoryError::Storage { message, .. }) => ApiError::new(
                StatusCode::SERVICE_UNAVAILABLE,
                "STORAGE_UNAVAILABLE",
                message,
            ),
            AppErr::Infrastructure { message, .. } => ApiError::new(
                StatusCode::SERVICE_UNAVAILABLE,
                "INFRASTRUCTURE_ERROR",
                message,
            ),
            AppErr::Timeout { operation } => ApiError::new(
                StatusCode::GATEWAY_TIMEOUT,
                "TIMEOUT",
                format!("{} timed out", operation),
            ),
            AppErr::Dispatch(message) => {
                ApiError::new(StatusCode::SERVICE_UNAVAILABLE, "DISPATCH_ERROR", message)
            }
            AppErr::CorruptData { location, message } => ApiError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "DATA_CORRUPTED",
                format!("{}: {}", location, message),
            ),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::warn!(status = %self.status, code = self.body.code, message = %self.body.message, "request failed");
        }
        (self.status, Json(self.body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_application_errors_to_status() {
        let invalid: ApiError =
            ApplicationError::from(domain::DomainError::invalid_argument("user_id", "missing")).into();
        assert_eq!(invalid.status(), StatusCode::BAD_REQUEST);

        let down: ApiError = ApplicationError::infrastructure("redis down").into();
        assert_eq!(down.status(), StatusCode::SERVICE_UNAVAILABLE);

        let slow: ApiError = ApplicationError::timeout("feed.read").into();
        assert_eq!(slow.status(), StatusCode::GATEWAY_TIMEOUT);

        let full: ApiError = ApplicationError::Dispatch("fan-out queue full".to_string()).into();
        assert_eq!(full.status(), StatusCode::SERVICE_UNAVAILABLE);

        let corrupt: ApiError = ApplicationError::corrupt_data("feed:global", "bad member").into();
        assert_eq!(corrupt.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
