//! Fuzz testing for the gateway's header parsing.
//!
//! Every value here arrives straight from a client, so none of these
//! functions may panic:
//!
//! - `canonical_string` and `SignatureVerifier::verify` on arbitrary parts
//! - `ReplayGuard::check` on arbitrary timestamp text and clock values
//! - `resolve_client_ip` on arbitrary forwarding headers
//! - `SuspiciousRequestDetector::inspect` on arbitrary query and headers
//!
//! # Running the Fuzz Tests
//!
//! ```bash
//! cargo +nightly install cargo-fuzz
//! cargo +nightly fuzz run fuzz_gateway_inputs -- -max_total_time=60
//! ```

#![no_main]

use arbitrary::Arbitrary;
use axum::body::Body;
use axum::http::Request;
use keygate::middleware::{
    ReplayGuard, SignatureVerifier, SuspiciousRequestDetector, canonical_string,
    resolve_client_ip,
};
use libfuzzer_sys::fuzz_target;
use std::sync::LazyLock;

static DETECTOR: LazyLock<Option<SuspiciousRequestDetector>> =
    LazyLock::new(|| SuspiciousRequestDetector::new().ok());

#[derive(Debug, Arbitrary)]
struct GatewayInput<'a> {
    method: &'a str,
    path: &'a str,
    query: Option<&'a str>,
    timestamp: &'a str,
    signature: &'a str,
    now: i64,
    validity: u64,
    forwarded_for: Option<&'a str>,
    real_ip: Option<&'a str>,
    user_agent: Option<&'a str>,
}

fuzz_target!(|input: GatewayInput<'_>| {
    let canonical = canonical_string(input.method, input.path, input.query, input.timestamp);
    let verifier = SignatureVerifier::new("fuzz-secret");
    let _ = verifier.verify(&canonical, input.signature);

    // Our own signature must always verify
    if let Ok(signature) = verifier.sign(&canonical) {
        assert!(verifier.verify(&canonical, &signature).unwrap_or(false));
    }

    let _ = ReplayGuard::new(input.validity).check(input.timestamp, input.now);

    let mut builder = Request::builder().uri("/");
    if let Some(xff) = input.forwarded_for {
        builder = builder.header("x-forwarded-for", xff);
    }
    if let Some(real_ip) = input.real_ip {
        builder = builder.header("x-real-ip", real_ip);
    }
    // Invalid header bytes are rejected by the builder, not by us
    if let Ok(req) = builder.body(Body::empty()) {
        let ip = resolve_client_ip(&req);
        assert!(!ip.is_empty());
    }

    if let Some(detector) = DETECTOR.as_ref() {
        let _ = detector.inspect(input.query, input.user_agent, None);
    }
});
