use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{ApiResponse, ErrorData};

/// Numeric error codes carried in the `code` field of error envelopes.
///
/// Several variants share a number: rate limiting and IP rejection are both
/// `10004` (told apart by HTTP status), and a bad timestamp reuses the
/// not-found code `10005`. Clients key on the number, so these are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    InvalidRequest,
    InvalidApiKey,
    SignatureVerificationFailed,
    RateLimitExceeded,
    IpNotAllowed,
    InvalidTimestamp,
    ResourceNotFound,
    InternalError,
}

impl ErrorCode {
    /// Wire value of the code.
    pub const fn code(self) -> i32 {
        match self {
            ErrorCode::InvalidRequest => 10001,
            ErrorCode::InvalidApiKey => 10002,
            ErrorCode::SignatureVerificationFailed => 10003,
            ErrorCode::RateLimitExceeded | ErrorCode::IpNotAllowed => 10004,
            ErrorCode::InvalidTimestamp | ErrorCode::ResourceNotFound => 10005,
            ErrorCode::InternalError => 10008,
        }
    }
}

/// Application-wide error types with appropriate HTTP status codes.
///
/// Gateway rejections are not `AppError`s; they are
/// [`Denial`](crate::middleware::gateway::Denial) values produced by the
/// pipeline. This type covers startup, configuration and handler failures.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    /// Envelope code for this error.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            AppError::ConfigError(_) | AppError::Internal(_) => ErrorCode::InternalError,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Log the full error details server-side for debugging
        // but only expose sanitized messages to clients
        tracing::error!(error = %self, "Request failed");

        let (status, message) = match &self {
            AppError::ConfigError(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Service configuration error",
            ),
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error"),
        };

        error_response(
            status,
            self.error_code(),
            message,
            ErrorData::new(Uuid::new_v4().to_string()),
        )
    }
}

/// Render an error envelope with the given status.
pub fn error_response(
    status: StatusCode,
    code: ErrorCode,
    message: &str,
    data: ErrorData,
) -> Response {
    let body = ApiResponse {
        code: code.code(),
        message: message.to_string(),
        data,
    };
    (status, Json(body)).into_response()
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;
