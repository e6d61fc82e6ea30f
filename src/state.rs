//! Shared application state for Axum handlers.
//!
//! This module provides thread-safe, clonable state that is shared across
//! all request handlers and the gateway layer. It includes:
//!
//! - **Gateway**: key registry, rate-limit windows and the check pipeline
//! - **Configuration**: Runtime configuration access
//!
//! # Structured Concurrency
//!
//! Background tasks are managed using `tokio_util::task::TaskTracker` and
//! `CancellationToken` for proper lifecycle management. Call `shutdown()`
//! to gracefully stop all background tasks before application exit.

use std::sync::Arc;
use std::time::Instant;

use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, trace};

use crate::clock::Clock;
use crate::config::Config;
use crate::error::AppResult;
use crate::metrics;
use crate::middleware::Gateway;

/// Shared application state for Axum handlers.
///
/// # Lifecycle
///
/// The idle-window purge task is spawned when the state is created, so this
/// must be constructed inside a Tokio runtime. Call `shutdown()` before
/// dropping to ensure clean task termination:
///
/// ```rust,ignore
/// let state = AppState::new(config, Arc::new(SystemClock))?;
/// // ... use state ...
/// state.shutdown().await;  // Wait for background tasks to complete
/// ```
#[derive(Clone)]
pub struct AppState {
    /// The authentication gateway shared with `GatewayLayer`
    pub gateway: Arc<Gateway>,
    /// Timestamp when the application started
    pub started_at: Instant,
    /// Application configuration
    pub config: Arc<Config>,
    /// Tracks spawned background tasks for graceful shutdown
    task_tracker: TaskTracker,
    /// Cancellation token for signaling background tasks to stop
    cancellation_token: CancellationToken,
}

impl AppState {
    /// Create application state from configuration.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ConfigError` if the key registry or the gateway
    /// cannot be built from `config`.
    pub fn new(config: Config, clock: Arc<dyn Clock>) -> AppResult<Self> {
        let registry = config.key_registry()?;
        let gateway = Arc::new(Gateway::new(registry, &config.security, clock)?);

        info!(
            keys = gateway.registry().len(),
            rate_limit_per_minute = config.security.rate_limit_per_minute,
            signature_validity_seconds = config.security.signature_validity_seconds,
            ip_whitelist_enabled = config.security.enable_ip_whitelist,
            stages = ?gateway.stages(),
            "Gateway initialized"
        );

        let state = Self {
            gateway,
            started_at: Instant::now(),
            config: Arc::new(config),
            task_tracker: TaskTracker::new(),
            cancellation_token: CancellationToken::new(),
        };

        state.spawn_purge_task();

        Ok(state)
    }

    /// Drop rate-limit windows idle for longer than the configured TTL.
    ///
    /// Returns the number of windows removed.
    pub fn purge_idle_windows(&self) -> usize {
        purge_idle_windows(&self.gateway, ttl_seconds(&self.config))
    }

    /// Spawn the periodic idle-window purge.
    fn spawn_purge_task(&self) {
        let gateway = self.gateway.clone();
        let period = self.config.rate_limit_cleanup_interval;
        let idle_ttl = ttl_seconds(&self.config);
        let cancel = self.cancellation_token.clone();

        self.task_tracker.spawn(async move {
            let mut ticker = interval(period);
            ticker.tick().await; // Skip the first immediate tick

            loop {
                tokio::select! {
                    biased; // Check cancellation first

                    _ = cancel.cancelled() => {
                        debug!("Rate limit purge task received cancellation signal");
                        break;
                    }
                    _ = ticker.tick() => {
                        purge_idle_windows(&gateway, idle_ttl);
                    }
                }
            }

            debug!("Rate limit purge task shutting down");
        });
    }

    /// Gracefully shutdown all background tasks.
    ///
    /// This method:
    /// 1. Signals all tasks to stop via cancellation token
    /// 2. Closes the task tracker (prevents new tasks)
    /// 3. Waits for all tasks to complete
    pub async fn shutdown(&self) {
        info!("Initiating graceful shutdown of background tasks");

        self.cancellation_token.cancel();
        self.task_tracker.close();
        self.task_tracker.wait().await;

        info!("All background tasks have completed");
    }

    /// Get the application uptime in seconds.
    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}

fn ttl_seconds(config: &Config) -> i64 {
    i64::try_from(config.rate_limit_idle_ttl.as_secs()).unwrap_or(i64::MAX)
}

fn purge_idle_windows(gateway: &Gateway, idle_ttl: i64) -> usize {
    let now = match gateway.now() {
        Ok(now) => now,
        Err(e) => {
            error!(error = %e, "Skipping rate limit purge");
            return 0;
        }
    };

    let limiter = gateway.limiter();
    let purged = limiter.purge_idle(now, idle_ttl);
    let remaining = limiter.tracked_keys();
    metrics::record_purge(purged, remaining);
    trace!(purged, remaining, "Rate limit purge complete");

    purged
}
