//! Application routing configuration with middleware stack.
//!
//! # Middleware Stack (outermost first)
//!
//! ```text
//! RequestId ─▶ PanicRequestId ─▶ CatchPanic ─▶ Trace ─▶ CORS ─▶ Gateway ─▶ handler
//!  X-Request-Id  id into the      10008 on                      401/403/429 under
//!  in and out    panic envelope   panic                         the protected prefix
//! ```
//!
//! # Route Groups
//!
//! - `/health` - Public liveness check
//! - `{prefix}/health`, `{prefix}/whoami` - Behind the gateway
//!
//! The gateway wraps the whole router rather than a nested sub-router, so it
//! sees the original request path. That path is part of the signed string.

use std::any::Any;

use axum::Router;
use axum::extract::Request;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::get;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{Any as AnyOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use uuid::Uuid;

use crate::handlers;
use crate::middleware::gateway::is_protected_path;
use crate::middleware::{Denial, GatewayLayer, RequestIdExt, RequestIdLayer};
use crate::state::AppState;

/// Build the application router with all routes and middleware configured.
///
/// # Arguments
///
/// * `state` - Application state containing config and the gateway
///
/// # Returns
///
/// Fully configured Axum router ready to be served.
pub fn build_router(state: AppState) -> Router {
    let config = &state.config;
    let prefix = config.protected_path_prefix.as_str();

    // =========================================================================
    // CORS Configuration
    // =========================================================================
    let cors = build_cors_layer(&config.cors_allowed_origins);

    // =========================================================================
    // Build Router with Routes
    // =========================================================================
    let mut router = Router::new()
        .route(&protected_route(prefix, "/health"), get(handlers::service_status))
        .route(&protected_route(prefix, "/whoami"), get(handlers::whoami));

    // With "/" as the prefix the protected health check takes this path
    if !is_protected_path(prefix, "/health") {
        router = router.route("/health", get(handlers::health_check));
    }

    // Fallback must exist before layering so the gateway covers it too
    router = router.fallback(handlers::not_found);

    // =========================================================================
    // Apply Middleware Stack (order matters - applied bottom to top)
    // =========================================================================

    // 1. Gateway (innermost, runs right before handlers)
    info!(prefix, "Gateway protecting path prefix");
    router = router.layer(GatewayLayer::new(state.gateway.clone(), prefix));

    // 2. CORS
    router = router.layer(cors);

    // 3. Tracing
    router = router.layer(TraceLayer::new_for_http());

    // 4. Panic guard
    router = router.layer(CatchPanicLayer::custom(handle_panic));

    // 5. Panic envelopes get the caller's request id
    router = router.layer(middleware::from_fn(attach_request_id_to_panics));

    // 6. Request ID (outermost)
    router = router.layer(RequestIdLayer::new());

    router.with_state(state)
}

/// Join the protected prefix and a route path.
fn protected_route(prefix: &str, path: &str) -> String {
    if prefix == "/" {
        path.to_string()
    } else {
        format!("{prefix}{path}")
    }
}

/// Marks a response produced by [`handle_panic`].
#[derive(Debug, Clone, Copy)]
struct RecoveredPanic;

/// Turn a panic anywhere below into the generic internal-error envelope.
///
/// The panic handler cannot see the request, so the envelope carries a fresh
/// id until [`attach_request_id_to_panics`] re-renders it.
fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = err
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| err.downcast_ref::<&str>().copied())
        .unwrap_or("non-string panic payload");
    error!(panic = detail, "Request processing panicked");

    let mut response = Denial::internal().into_response(&Uuid::new_v4().to_string());
    response.extensions_mut().insert(RecoveredPanic);
    response
}

/// Re-render recovered panics with the request's `X-Request-Id`.
async fn attach_request_id_to_panics(req: Request, next: Next) -> Response {
    let request_id = req.request_id();
    let response = next.run(req).await;

    match request_id {
        Some(id) if response.extensions().get::<RecoveredPanic>().is_some() => {
            Denial::internal().into_response(&id)
        }
        _ => response,
    }
}

/// Build CORS layer from configuration.
///
/// # Arguments
///
/// * `allowed_origins` - List of allowed origins, or `["*"]` for any origin
///
/// # Security Note
///
/// Using `*` (any origin) is convenient for development but should be
/// avoided in production. Specify explicit origins instead.
fn build_cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let allow_any = allowed_origins.iter().any(|o| o == "*");

    if allow_any {
        CorsLayer::new()
            .allow_origin(AnyOrigin)
            .allow_methods(AnyOrigin)
            .allow_headers(AnyOrigin)
    } else {
        let origins: Vec<_> = allowed_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(AnyOrigin)
            .allow_headers(AnyOrigin)
    }
}
