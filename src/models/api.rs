use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// `code` of every successful envelope.
pub const SUCCESS_CODE: i32 = 200;

/// `strftime` layout of envelope timestamps (UTC, second precision).
pub const ENVELOPE_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Format a UTC instant the way envelopes carry it.
pub fn envelope_timestamp(at: DateTime<Utc>) -> String {
    at.format(ENVELOPE_TIMESTAMP_FORMAT).to_string()
}

/// Uniform response envelope shared by success and error bodies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    /// `200` on success, otherwise a numeric error code
    pub code: i32,
    /// Human-readable outcome
    pub message: String,
    /// Payload, or request diagnostics on error
    pub data: T,
}

impl<T> ApiResponse<T> {
    /// Wrap `data` in a success envelope.
    pub fn success(data: T) -> Self {
        Self {
            code: SUCCESS_CODE,
            message: "success".to_string(),
            data,
        }
    }
}

/// `data` of an error envelope.
///
/// Stage-specific fields (`limit`, `client_ip`, `server_time`, ...) are
/// flattened next to the request id and timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorData {
    /// `X-Request-Id` of the failed request
    pub request_id: String,
    /// When the error was produced
    pub timestamp: String,
    #[serde(flatten)]
    pub details: Map<String, Value>,
}

impl ErrorData {
    /// Diagnostics stamped with the current time.
    pub fn new(request_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            timestamp: envelope_timestamp(Utc::now()),
            details: Map::new(),
        }
    }
}

/// Public liveness response.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Service health status
    pub status: String,
    /// Service version
    pub version: String,
    /// Current timestamp
    pub timestamp: DateTime<Utc>,
    /// Seconds since the server started
    pub uptime_seconds: u64,
}

/// Payload of the protected health endpoint.
#[derive(Debug, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub status: String,
    pub version: String,
    pub timestamp: String,
}

/// The caller as seen by the gateway.
#[derive(Debug, Serialize, Deserialize)]
pub struct WhoAmI {
    /// Display name registered for the API key
    pub key_name: String,
    /// Resolved client IP
    pub client_ip: String,
}
