//! # keygate
//!
//! An inbound authentication and rate-limiting gateway for Axum services.
//! Every request under a protected path prefix must pass, in order:
//!
//! - **API key**: `Authorization: Bearer <key>` or `X-API-Key`, looked up in a static registry
//! - **Rate limit**: per-key fixed 60-second window with `X-RateLimit-*` headers
//! - **Signature**: Base64 HMAC-SHA256 of the canonical request in `X-Signature`
//! - **Replay guard**: `X-Timestamp` within the configured validity window
//! - **IP allow-list**: optional exact-match client IP check
//!
//! The first failing check produces a JSON error envelope
//! `{code, message, data: {request_id, timestamp, ...}}`.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Axum HTTP Server                       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Request ID → CatchPanic → Trace → CORS                     │
//! ├─────────────────────────────────────────────────────────────┤
//! │  GatewayLayer (protected prefix only)                       │
//! │    ApiKey → RateLimit → Signature → Timestamp → IpAllowList │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Handlers (health, whoami)                                  │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use keygate::{AppState, Config, SystemClock, build_router};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let state = AppState::new(config, Arc::new(SystemClock))?;
//!     let app = build_router(state);
//!
//!     // Serve with `into_make_service_with_connect_info::<SocketAddr>()`...
//!     Ok(())
//! }
//! ```
//!
//! ## Signing a Request
//!
//! ```rust
//! use keygate::middleware::{SignatureVerifier, canonical_string};
//!
//! let canonical = canonical_string("GET", "/api/v1/process-system/health", None, "1700000000");
//! let signature = SignatureVerifier::new("shared-secret").sign(&canonical)?;
//! assert_eq!(signature.len(), 44);
//! # Ok::<(), keygate::middleware::signature::SigningKeyError>(())
//! ```

pub mod clock;
pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod models;
pub mod registry;
pub mod routes;
pub mod state;
pub mod utils;

// Re-exports for convenience
pub use clock::{Clock, ClockError, ManualClock, SystemClock};
pub use config::{Config, SecurityConfig};
pub use error::{AppError, AppResult, ErrorCode};
pub use middleware::{AuthenticatedKey, Gateway, GatewayLayer};
pub use registry::{ApiKeyEntry, KeyRegistry};
pub use routes::build_router;
pub use state::AppState;
