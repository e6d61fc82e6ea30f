//! Unit tests for response models and error codes.
#![allow(clippy::unwrap_used, clippy::expect_used)]

use chrono::{TimeZone, Utc};
use serde_json::json;

// Note: These tests can be run with: cargo test --test model_tests

mod envelope_tests {
    use super::*;
    use keygate::models::{
        ApiResponse, ENVELOPE_TIMESTAMP_FORMAT, ErrorData, SUCCESS_CODE, ServiceStatus, WhoAmI,
        envelope_timestamp,
    };

    #[test]
    fn test_success_envelope_shape() {
        let response = ApiResponse::success(WhoAmI {
            key_name: "Partner".to_string(),
            client_ip: "10.0.0.1".to_string(),
        });

        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(
            value,
            json!({
                "code": 200,
                "message": "success",
                "data": { "key_name": "Partner", "client_ip": "10.0.0.1" }
            })
        );
        assert_eq!(response.code, SUCCESS_CODE);
    }

    #[test]
    fn test_envelope_timestamp_is_second_precision_utc() {
        let at = Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 5).unwrap();
        assert_eq!(envelope_timestamp(at), "2024-01-15T10:30:05Z");
        assert_eq!(ENVELOPE_TIMESTAMP_FORMAT, "%Y-%m-%dT%H:%M:%SZ");
    }

    #[test]
    fn test_error_data_flattens_details() {
        let mut data = ErrorData::new("req-1");
        data.details.insert("limit".to_string(), json!(100));
        data.details.insert("remaining".to_string(), json!(0));
        data.details.insert("reset".to_string(), json!(1_700_000_060_i64));

        let value = serde_json::to_value(&data).unwrap();
        assert_eq!(value["request_id"], "req-1");
        assert_eq!(value["limit"], 100);
        assert_eq!(value["remaining"], 0);
        assert_eq!(value["reset"], 1_700_000_060_i64);
        assert!(value.get("details").is_none());
    }

    #[test]
    fn test_error_data_timestamp_parses_with_envelope_format() {
        let data = ErrorData::new("req-2");
        let parsed =
            chrono::NaiveDateTime::parse_from_str(&data.timestamp, ENVELOPE_TIMESTAMP_FORMAT);
        assert!(parsed.is_ok(), "unexpected timestamp {}", data.timestamp);
    }

    #[test]
    fn test_error_data_without_details_has_two_fields() {
        let value = serde_json::to_value(ErrorData::new("req-3")).unwrap();
        assert_eq!(value.as_object().unwrap().len(), 2);
    }

    #[test]
    fn test_error_data_deserializes_extra_fields_into_details() {
        let data: ErrorData = serde_json::from_value(json!({
            "request_id": "req-4",
            "timestamp": "2024-01-15T10:30:00Z",
            "client_ip": "203.0.113.7"
        }))
        .unwrap();

        assert_eq!(data.request_id, "req-4");
        assert_eq!(data.details.get("client_ip"), Some(&json!("203.0.113.7")));
    }

    #[test]
    fn test_service_status_round_trip() {
        let status = ServiceStatus {
            status: "UP".to_string(),
            version: "0.1.0".to_string(),
            timestamp: "2024-01-15T10:30:00Z".to_string(),
        };
        let json = serde_json::to_string(&status).unwrap();
        let back: ServiceStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(back.status, "UP");
        assert_eq!(back.timestamp, status.timestamp);
    }
}

mod error_code_tests {
    use keygate::ErrorCode;

    #[test]
    fn test_wire_codes() {
        assert_eq!(ErrorCode::InvalidRequest.code(), 10001);
        assert_eq!(ErrorCode::InvalidApiKey.code(), 10002);
        assert_eq!(ErrorCode::SignatureVerificationFailed.code(), 10003);
        assert_eq!(ErrorCode::RateLimitExceeded.code(), 10004);
        assert_eq!(ErrorCode::IpNotAllowed.code(), 10004);
        assert_eq!(ErrorCode::InvalidTimestamp.code(), 10005);
        assert_eq!(ErrorCode::ResourceNotFound.code(), 10005);
        assert_eq!(ErrorCode::InternalError.code(), 10008);
    }
}

mod registry_tests {
    use keygate::KeyRegistry;

    #[test]
    fn test_lookup_is_exact() {
        let registry =
            KeyRegistry::from_pairs([("key-a", "System A"), ("key-b", "System B")]).unwrap();

        assert_eq!(registry.len(), 2);
        assert_eq!(
            registry.lookup("key-a").map(|e| e.display_name.as_str()),
            Some("System A")
        );
        assert!(registry.lookup("KEY-A").is_none());
        assert!(registry.lookup(" key-a").is_none());
        assert!(registry.lookup("").is_none());
    }
}
