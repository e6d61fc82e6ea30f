//! Endpoints that read what the gateway established about the caller.

use axum::Json;
use axum::extract::Extension;
use axum::http::{HeaderMap, StatusCode};
use axum::response::Response;
use tracing::instrument;
use uuid::Uuid;

use crate::error::{AppError, AppResult, ErrorCode, error_response};
use crate::middleware::{AuthenticatedKey, REQUEST_ID_HEADER};
use crate::models::{ApiResponse, ErrorData, WhoAmI};

/// `GET {prefix}/whoami`: the key name and client IP of the caller.
///
/// # Errors
///
/// Returns `AppError::Internal` if the route is reached without passing the
/// gateway, which means the router is misassembled.
#[instrument(skip_all)]
pub async fn whoami(
    identity: Option<Extension<AuthenticatedKey>>,
) -> AppResult<Json<ApiResponse<WhoAmI>>> {
    let Extension(identity) = identity.ok_or_else(|| {
        AppError::Internal("whoami reached without an authenticated key".to_string())
    })?;

    Ok(Json(ApiResponse::success(WhoAmI {
        key_name: identity.key_name,
        client_ip: identity.client_ip,
    })))
}

/// Fallback for unknown routes: a 404 envelope carrying the request id.
pub async fn not_found(headers: HeaderMap) -> Response {
    let request_id = headers
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map_or_else(|| Uuid::new_v4().to_string(), str::to_string);

    error_response(
        StatusCode::NOT_FOUND,
        ErrorCode::ResourceNotFound,
        "Resource not found",
        ErrorData::new(request_id),
    )
}
