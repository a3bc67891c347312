//! Mapping of supervisor errors onto HTTP responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::AppError;

/// JSON error body: `{"error": kind, "message": text}`.
#[derive(Debug, Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

/// An [`AppError`] on its way out of a handler.
#[derive(Debug)]
pub struct ApiError(pub AppError);

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        Self(err)
    }
}

/// Status code reported for `err`.
#[must_use]
pub fn status_for(err: &AppError) -> StatusCode {
    match err {
        AppError::AlreadyRunning(_) => StatusCode::CONFLICT,
        AppError::NotFound(_) => StatusCode::NOT_FOUND,
        AppError::InvalidPayload(_) => StatusCode::BAD_REQUEST,
        AppError::StartupTimeout(_) | AppError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        AppError::ShuttingDown(_) | AppError::Cancelled(_) => StatusCode::SERVICE_UNAVAILABLE,
        AppError::NotRunning(_)
        | AppError::UnexpectedFirstMessage(_)
        | AppError::Faulted(_)
        | AppError::OutOfOrder(_)
        | AppError::Send(_)
        | AppError::Recv(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        let body = ErrorBody {
            error: self.0.kind(),
            message: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
