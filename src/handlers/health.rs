//! Health endpoints.
//!
//! # Endpoints
//!
//! - `GET /health` - Public liveness check, never touches the gateway
//! - `GET {prefix}/health` - Same check behind the gateway, in the success
//!   envelope, so partners can verify their key, signature and clock in one call

use axum::Json;
use axum::extract::State;
use chrono::Utc;
use tracing::instrument;

use crate::models::{ApiResponse, HealthResponse, ServiceStatus, envelope_timestamp};
use crate::state::AppState;

/// Public health check endpoint.
///
/// # Response Body
///
/// ```json
/// {
///   "status": "healthy",
///   "version": "0.1.0",
///   "timestamp": "2024-01-15T10:30:00Z",
///   "uptime_seconds": 42
/// }
/// ```
#[instrument(skip(state))]
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now(),
        uptime_seconds: state.uptime_seconds(),
    })
}

/// Protected health check.
///
/// # Response Body
///
/// ```json
/// {
///   "code": 200,
///   "message": "success",
///   "data": { "status": "UP", "version": "0.1.0", "timestamp": "2024-01-15T10:30:00Z" }
/// }
/// ```
#[instrument]
pub async fn service_status() -> Json<ApiResponse<ServiceStatus>> {
    Json(ApiResponse::success(ServiceStatus {
        status: "UP".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: envelope_timestamp(Utc::now()),
    }))
}
