mod api;

pub use api::{
    ApiResponse, ENVELOPE_TIMESTAMP_FORMAT, ErrorData, HealthResponse, SUCCESS_CODE,
    ServiceStatus, WhoAmI, envelope_timestamp,
};
