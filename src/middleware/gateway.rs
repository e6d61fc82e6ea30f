//! The authentication gateway in front of protected routes.
//!
//! # Pipeline
//!
//! Every request under the protected prefix runs through an ordered list of
//! [`Stage`]s. Each stage returns a [`Decision`]; the first `Deny` ends the
//! evaluation and no later stage runs.
//!
//! ```text
//! OPTIONS ─────────────────────────────────────────────────────────▶ Allow
//! ApiKey ─▶ RateLimit ─▶ Signature ─▶ Timestamp ─▶ IpAllowList [─▶ Suspicious] ─▶ Allow
//!   │          │             │            │             │               │
//!  401        429           401          401           403             400
//! 10002      10004         10003        10005         10004           10001
//! ```
//!
//! Any internal failure (clock before the epoch, HMAC keying error) becomes a
//! `10008` / 500 denial. Panics are caught further out by `CatchPanicLayer`.
//!
//! # Response Decoration
//!
//! Once the rate-limit stage has run, the `X-RateLimit-*` headers are attached
//! to the response whatever the final outcome. Allowed requests carry an
//! [`AuthenticatedKey`] extension for handlers; the raw key is never
//! propagated or logged.
//!
//! # API Key Extraction
//!
//! `Authorization: Bearer <key>` wins when present. Otherwise `X-API-Key` is
//! used. An `Authorization` header with any other scheme is ignored.

use std::fmt;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;

use axum::body::Body;
use axum::http::header::{AUTHORIZATION, REFERER, USER_AGENT};
use axum::http::{HeaderMap, Method, Request, Response, StatusCode};
use serde_json::{Map, Value};
use thiserror::Error;
use tower::{Layer, Service};
use tracing::{debug, error, warn};
use uuid::Uuid;

use super::ip::{IpAllowList, resolve_client_ip};
use super::rate_limit::{FixedWindowRateLimiter, RateLimitStatus};
use super::replay::{ReplayGuard, TIMESTAMP_HEADER};
use super::request_id::RequestIdExt;
use super::signature::{SIGNATURE_HEADER, SignatureVerifier, SigningKeyError, canonical_string};
use super::suspicious::SuspiciousRequestDetector;
use crate::clock::{Clock, ClockError};
use crate::config::{SecurityConfig, normalize_prefix};
use crate::error::{AppError, AppResult, ErrorCode, error_response};
use crate::metrics;
use crate::models::{ErrorData, SUCCESS_CODE};
use crate::registry::{ApiKeyEntry, KeyRegistry};

/// Header carrying the API key when no bearer token is sent.
pub const API_KEY_HEADER: &str = "x-api-key";

const BEARER_PREFIX: &str = "Bearer ";

/// One check in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    ApiKey,
    RateLimit,
    Signature,
    Timestamp,
    IpAllowList,
    SuspiciousRequest,
}

impl Stage {
    /// Stable name used in logs and metric labels.
    pub const fn name(self) -> &'static str {
        match self {
            Stage::ApiKey => "api_key",
            Stage::RateLimit => "rate_limit",
            Stage::Signature => "signature",
            Stage::Timestamp => "timestamp",
            Stage::IpAllowList => "ip_allow_list",
            Stage::SuspiciousRequest => "suspicious_request",
        }
    }
}

/// Stages every gateway runs, in order.
pub const STANDARD_PIPELINE: [Stage; 5] = [
    Stage::ApiKey,
    Stage::RateLimit,
    Stage::Signature,
    Stage::Timestamp,
    Stage::IpAllowList,
];

/// A rejection: envelope code, HTTP status, message and extra `data` fields.
#[derive(Debug, Clone, PartialEq)]
pub struct Denial {
    pub code: ErrorCode,
    pub status: StatusCode,
    pub message: &'static str,
    pub details: Map<String, Value>,
}

impl Denial {
    pub fn new(code: ErrorCode, status: StatusCode, message: &'static str) -> Self {
        Self {
            code,
            status,
            message,
            details: Map::new(),
        }
    }

    /// Generic 500 that reveals nothing about the failure.
    pub fn internal() -> Self {
        Self::new(
            ErrorCode::InternalError,
            StatusCode::INTERNAL_SERVER_ERROR,
            "Internal server error",
        )
    }

    fn with_detail(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.details.insert(key.to_string(), value.into());
        self
    }

    /// Render the error envelope for this denial.
    pub fn into_response(self, request_id: &str) -> Response<Body> {
        let data = ErrorData {
            details: self.details,
            ..ErrorData::new(request_id)
        };
        error_response(self.status, self.code, self.message, data)
    }
}

/// Verdict of a stage, and of the whole pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    Allow,
    Deny(Denial),
}

/// Internal failures while evaluating a stage.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error(transparent)]
    ClockBeforeEpoch(#[from] ClockError),

    #[error(transparent)]
    InvalidSigningKey(#[from] SigningKeyError),

    #[error("{} stage ran before the API key was resolved", .0.name())]
    MissingIdentity(Stage),
}

/// The caller of an allowed request, inserted into request extensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedKey {
    /// Display name registered for the key.
    pub key_name: String,
    /// Client IP the gateway evaluated.
    pub client_ip: String,
}

/// Everything the stages read from a request.
#[derive(Clone)]
pub struct RequestContext {
    pub method: Method,
    pub path: String,
    pub query: Option<String>,
    pub api_key: Option<String>,
    pub signature: Option<String>,
    pub timestamp: Option<String>,
    pub user_agent: Option<String>,
    pub referer: Option<String>,
    pub client_ip: String,
}

// Credentials stay out of logs.
impl fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestContext")
            .field("method", &self.method)
            .field("path", &self.path)
            .field("query", &self.query)
            .field("api_key_present", &self.api_key.is_some())
            .field("signature_present", &self.signature.is_some())
            .field("timestamp", &self.timestamp)
            .field("client_ip", &self.client_ip)
            .finish_non_exhaustive()
    }
}

impl RequestContext {
    /// Capture the method, target, credential headers and client IP.
    pub fn from_request<B>(req: &Request<B>) -> Self {
        let headers = req.headers();
        Self {
            method: req.method().clone(),
            path: req.uri().path().to_string(),
            query: req.uri().query().map(str::to_string),
            api_key: extract_api_key(headers),
            signature: header_string(headers, SIGNATURE_HEADER),
            timestamp: header_string(headers, TIMESTAMP_HEADER),
            user_agent: header_string(headers, USER_AGENT.as_str()),
            referer: header_string(headers, REFERER.as_str()),
            client_ip: resolve_client_ip(req).into_owned(),
        }
    }
}

fn header_string(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// Bearer token if the `Authorization` header uses that scheme, else `X-API-Key`.
fn extract_api_key(headers: &HeaderMap) -> Option<String> {
    if let Some(token) = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix(BEARER_PREFIX))
    {
        return Some(token.to_string());
    }
    header_string(headers, API_KEY_HEADER)
}

/// Result of running the pipeline over one request.
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub decision: Decision,
    /// Stage that denied the request, if any.
    pub denied_by: Option<Stage>,
    /// Rate-limit outcome, once that stage has run.
    pub rate_limit: Option<RateLimitStatus>,
    /// Caller identity, once the API key stage has passed.
    pub identity: Option<AuthenticatedKey>,
}

impl Evaluation {
    pub fn is_allowed(&self) -> bool {
        matches!(self.decision, Decision::Allow)
    }
}

/// Per-evaluation scratch shared between stages.
#[derive(Default)]
struct PipelineState<'a> {
    entry: Option<&'a ApiKeyEntry>,
    rate_limit: Option<RateLimitStatus>,
}

/// Sequences the checks and owns their state.
pub struct Gateway {
    registry: KeyRegistry,
    limiter: FixedWindowRateLimiter,
    verifier: SignatureVerifier,
    replay: ReplayGuard,
    allow_list: IpAllowList,
    detector: Option<SuspiciousRequestDetector>,
    stages: Vec<Stage>,
    clock: Arc<dyn Clock>,
}

impl fmt::Debug for Gateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Gateway")
            .field("registry", &self.registry)
            .field("limiter", &self.limiter)
            .field("replay", &self.replay)
            .field("allow_list", &self.allow_list)
            .field("stages", &self.stages)
            .finish_non_exhaustive()
    }
}

impl Gateway {
    /// Build a gateway for `registry` with the given settings.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ConfigError` if the rate limit is zero or the
    /// suspicious-request pattern fails to compile.
    pub fn new(
        registry: KeyRegistry,
        security: &SecurityConfig,
        clock: Arc<dyn Clock>,
    ) -> AppResult<Self> {
        let limiter = FixedWindowRateLimiter::new(security.rate_limit_per_minute)
            .map_err(|e| AppError::ConfigError(e.to_string()))?;

        let detector = if security.block_suspicious_requests {
            Some(SuspiciousRequestDetector::new().map_err(|e| {
                AppError::ConfigError(format!("Invalid suspicious-request pattern: {e}"))
            })?)
        } else {
            None
        };

        let mut stages = STANDARD_PIPELINE.to_vec();
        if detector.is_some() {
            stages.push(Stage::SuspiciousRequest);
        }

        Ok(Self {
            registry,
            limiter,
            verifier: SignatureVerifier::new(security.signature_secret.as_bytes()),
            replay: ReplayGuard::new(security.signature_validity_seconds),
            allow_list: IpAllowList::new(security.enable_ip_whitelist, &security.ip_whitelist),
            detector,
            stages,
            clock,
        })
    }

    /// Stages in evaluation order.
    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn limiter(&self) -> &FixedWindowRateLimiter {
        &self.limiter
    }

    pub fn registry(&self) -> &KeyRegistry {
        &self.registry
    }

    /// Current time from the gateway's clock.
    ///
    /// # Errors
    ///
    /// Propagates [`ClockError`] from the clock.
    pub fn now(&self) -> Result<i64, ClockError> {
        self.clock.now_epoch_seconds()
    }

    /// Run the pipeline over `ctx`.
    pub fn evaluate(&self, ctx: &RequestContext) -> Evaluation {
        if ctx.method == Method::OPTIONS {
            debug!(path = %ctx.path, "Preflight request bypasses gateway");
            return Evaluation {
                decision: Decision::Allow,
                denied_by: None,
                rate_limit: None,
                identity: None,
            };
        }

        let mut state = PipelineState::default();
        let mut outcome = (Decision::Allow, None);

        for &stage in &self.stages {
            match self.run_stage(stage, ctx, &mut state) {
                Ok(Decision::Allow) => {}
                Ok(Decision::Deny(denial)) => {
                    outcome = (Decision::Deny(denial), Some(stage));
                    break;
                }
                Err(err) => {
                    error!(stage = stage.name(), error = %err, path = %ctx.path, "Gateway check failed");
                    outcome = (Decision::Deny(Denial::internal()), Some(stage));
                    break;
                }
            }
        }

        let (decision, denied_by) = outcome;
        let key_name = state.entry.map(|entry| entry.display_name.as_str());

        match (&decision, denied_by) {
            (Decision::Deny(denial), Some(stage)) => warn!(
                stage = stage.name(),
                code = denial.code.code(),
                status = denial.status.as_u16(),
                api_key_name = key_name.unwrap_or("-"),
                client_ip = %ctx.client_ip,
                method = %ctx.method,
                path = %ctx.path,
                "Request denied"
            ),
            _ => debug!(
                api_key_name = key_name.unwrap_or("-"),
                client_ip = %ctx.client_ip,
                path = %ctx.path,
                "Request allowed"
            ),
        }

        Evaluation {
            decision,
            denied_by,
            rate_limit: state.rate_limit,
            identity: state.entry.map(|entry| AuthenticatedKey {
                key_name: entry.display_name.clone(),
                client_ip: ctx.client_ip.clone(),
            }),
        }
    }

    fn run_stage<'a>(
        &'a self,
        stage: Stage,
        ctx: &RequestContext,
        state: &mut PipelineState<'a>,
    ) -> Result<Decision, GatewayError> {
        match stage {
            Stage::ApiKey => Ok(self.check_api_key(ctx, state)),
            Stage::RateLimit => self.check_rate_limit(state),
            Stage::Signature => self.check_signature(ctx),
            Stage::Timestamp => self.check_timestamp(ctx),
            Stage::IpAllowList => Ok(self.check_ip(ctx)),
            Stage::SuspiciousRequest => Ok(self.check_suspicious(ctx)),
        }
    }

    fn check_api_key<'a>(&'a self, ctx: &RequestContext, state: &mut PipelineState<'a>) -> Decision {
        match ctx.api_key.as_deref().and_then(|key| self.registry.lookup(key)) {
            Some(entry) => {
                state.entry = Some(entry);
                Decision::Allow
            }
            None => Decision::Deny(Denial::new(
                ErrorCode::InvalidApiKey,
                StatusCode::UNAUTHORIZED,
                "Invalid API key",
            )),
        }
    }

    fn check_rate_limit(&self, state: &mut PipelineState<'_>) -> Result<Decision, GatewayError> {
        let entry = state
            .entry
            .ok_or(GatewayError::MissingIdentity(Stage::RateLimit))?;
        let status = self.limiter.check(&entry.key, self.now()?);
        state.rate_limit = Some(status);

        if status.allowed {
            return Ok(Decision::Allow);
        }

        Ok(Decision::Deny(
            Denial::new(
                ErrorCode::RateLimitExceeded,
                StatusCode::TOO_MANY_REQUESTS,
                "Rate limit exceeded",
            )
            .with_detail("limit", status.limit)
            .with_detail("remaining", status.remaining)
            .with_detail("reset", status.reset_at),
        ))
    }

    fn check_signature(&self, ctx: &RequestContext) -> Result<Decision, GatewayError> {
        let Some(supplied) = ctx.signature.as_deref().filter(|s| !s.trim().is_empty()) else {
            return Ok(Decision::Deny(Denial::new(
                ErrorCode::SignatureVerificationFailed,
                StatusCode::UNAUTHORIZED,
                "Missing signature",
            )));
        };

        let canonical = canonical_string(
            ctx.method.as_str(),
            &ctx.path,
            ctx.query.as_deref(),
            ctx.timestamp.as_deref().unwrap_or_default(),
        );

        if self.verifier.verify(&canonical, supplied)? {
            Ok(Decision::Allow)
        } else {
            Ok(Decision::Deny(Denial::new(
                ErrorCode::SignatureVerificationFailed,
                StatusCode::UNAUTHORIZED,
                "Signature verification failed",
            )))
        }
    }

    fn check_timestamp(&self, ctx: &RequestContext) -> Result<Decision, GatewayError> {
        let now = self.now()?;
        let rejected = |message: &'static str| {
            Decision::Deny(
                Denial::new(ErrorCode::InvalidTimestamp, StatusCode::UNAUTHORIZED, message)
                    .with_detail("server_time", now),
            )
        };

        let Some(raw) = ctx.timestamp.as_deref().filter(|s| !s.trim().is_empty()) else {
            return Ok(rejected("Missing timestamp"));
        };

        match self.replay.check(raw, now) {
            Ok(_) => Ok(Decision::Allow),
            Err(rejection) => {
                debug!(?rejection, "Timestamp outside validity window");
                Ok(rejected("Request timestamp expired or invalid"))
            }
        }
    }

    fn check_ip(&self, ctx: &RequestContext) -> Decision {
        if self.allow_list.is_allowed(&ctx.client_ip) {
            return Decision::Allow;
        }
        Decision::Deny(
            Denial::new(
                ErrorCode::IpNotAllowed,
                StatusCode::FORBIDDEN,
                "IP address not allowed",
            )
            .with_detail("client_ip", ctx.client_ip.clone()),
        )
    }

    fn check_suspicious(&self, ctx: &RequestContext) -> Decision {
        let hit = self.detector.as_ref().and_then(|detector| {
            detector.inspect(
                ctx.query.as_deref(),
                ctx.user_agent.as_deref(),
                ctx.referer.as_deref(),
            )
        });

        match hit {
            None => Decision::Allow,
            Some(source) => Decision::Deny(
                Denial::new(
                    ErrorCode::InvalidRequest,
                    StatusCode::BAD_REQUEST,
                    "Suspicious request rejected",
                )
                .with_detail("source", source.as_str()),
            ),
        }
    }
}

/// Whether `path` is `prefix` itself or lies below it.
pub fn is_protected_path(prefix: &str, path: &str) -> bool {
    if prefix == "/" {
        return true;
    }
    path.strip_prefix(prefix)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
}

/// Tower layer applying the [`Gateway`] to requests under a path prefix.
#[derive(Clone)]
pub struct GatewayLayer {
    gateway: Arc<Gateway>,
    protected_prefix: Arc<str>,
}

impl GatewayLayer {
    /// Guard every path under `protected_prefix` (trailing slashes ignored).
    pub fn new(gateway: Arc<Gateway>, protected_prefix: &str) -> Self {
        Self {
            gateway,
            protected_prefix: normalize_prefix(protected_prefix).into(),
        }
    }
}

impl<S> Layer<S> for GatewayLayer {
    type Service = GatewayService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        GatewayService {
            inner,
            gateway: self.gateway.clone(),
            protected_prefix: self.protected_prefix.clone(),
        }
    }
}

/// Gateway service wrapper.
#[derive(Clone)]
pub struct GatewayService<S> {
    inner: S,
    gateway: Arc<Gateway>,
    protected_prefix: Arc<str>,
}

impl<S> Service<Request<Body>> for GatewayService<S>
where
    S: Service<Request<Body>, Response = Response<Body>> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response<Body>;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<Body>) -> Self::Future {
        let mut inner = self.inner.clone();

        if !is_protected_path(&self.protected_prefix, req.uri().path()) {
            return Box::pin(async move { inner.call(req).await });
        }

        let started = Instant::now();
        let ctx = RequestContext::from_request(&req);
        let evaluation = self.gateway.evaluate(&ctx);
        let elapsed = started.elapsed().as_secs_f64();
        let rate_limit = evaluation.rate_limit;

        match evaluation.decision {
            Decision::Allow => {
                metrics::record_decision("allow", "complete", SUCCESS_CODE, elapsed);
                if let Some(identity) = evaluation.identity {
                    req.extensions_mut().insert(identity);
                }

                Box::pin(async move {
                    let mut response = inner.call(req).await?;
                    if let Some(status) = rate_limit {
                        status.apply_headers(response.headers_mut());
                    }
                    Ok(response)
                })
            }
            Decision::Deny(denial) => {
                let stage = evaluation.denied_by.map_or("unknown", Stage::name);
                metrics::record_decision("deny", stage, denial.code.code(), elapsed);

                let request_id = req
                    .request_id()
                    .unwrap_or_else(|| Uuid::new_v4().to_string());
                let mut response = denial.into_response(&request_id);
                if let Some(status) = rate_limit {
                    status.apply_headers(response.headers_mut());
                }

                Box::pin(async move { Ok(response) })
            }
        }
    }
}
