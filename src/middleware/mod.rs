//! HTTP middleware and the checks behind the authentication gateway.
//!
//! - **Gateway**: ordered API key, rate limit, signature, timestamp and IP checks
//! - **Rate Limiting**: per-key fixed 60-second windows
//! - **Signatures**: HMAC-SHA256 over a canonical request string
//! - **Replay Guard**: `X-Timestamp` tolerance window
//! - **Client IP**: forwarding-header resolution and the optional allow-list
//! - **Request ID**: automatic generation and propagation for tracing
//!
//! # Architecture
//!
//! ```text
//! Request → Request ID → Trace → CORS → Gateway → Handler → Response
//!               ↓                          ↓
//!        X-Request-Id header     401 / 403 / 429 / 500 envelope
//!                                + X-RateLimit-* headers
//! ```
//!
//! # Security Considerations
//!
//! - Signatures are compared in constant time
//! - Raw API keys and the signing secret never appear in logs or responses
//! - The client IP comes from forwarding headers; see [`ip`] before enabling
//!   the allow-list

pub mod gateway;
pub mod ip;
pub mod rate_limit;
pub mod replay;
pub mod request_id;
pub mod signature;
pub mod suspicious;

pub use gateway::{
    API_KEY_HEADER, AuthenticatedKey, Decision, Denial, Evaluation, Gateway, GatewayError,
    GatewayLayer, RequestContext, STANDARD_PIPELINE, Stage,
};
pub use ip::{IpAllowList, UNKNOWN_IP, resolve_client_ip};
pub use rate_limit::{FixedWindowRateLimiter, RateLimitError, RateLimitStatus, WINDOW_SECONDS};
pub use replay::{ReplayGuard, TIMESTAMP_HEADER};
pub use request_id::{REQUEST_ID_HEADER, RequestIdExt, RequestIdLayer};
pub use signature::{SIGNATURE_HEADER, SignatureVerifier, canonical_string};
pub use suspicious::{SuspiciousRequestDetector, SuspiciousSource};
