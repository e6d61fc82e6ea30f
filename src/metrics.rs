//! Prometheus metrics for application observability.
//!
//! Metrics are exposed via a dedicated HTTP listener (default: `0.0.0.0:9090`).
//!
//! # Available Metrics
//!
//! ## Counters
//! - `keygate_requests_total` - Gateway decisions (labels: outcome, stage, code)
//! - `keygate_rate_limit_purged_total` - Idle rate-limit windows evicted
//!
//! ## Histograms
//! - `keygate_check_duration_seconds` - Time spent evaluating the pipeline
//!
//! ## Gauges
//! - `keygate_rate_limit_windows` - Rate-limit windows held after the last purge
//!
//! # Usage
//!
//! ```rust,ignore
//! use keygate::metrics::{init_metrics, record_decision};
//!
//! init_metrics("0.0.0.0:9090".parse()?)?;
//! record_decision("deny", "rate_limit", 10004, 0.0002);
//! ```

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::{error, info};

/// Metric names as constants for consistency.
pub mod names {
    pub const REQUESTS_TOTAL: &str = "keygate_requests_total";
    pub const CHECK_DURATION_SECONDS: &str = "keygate_check_duration_seconds";
    pub const RATE_LIMIT_WINDOWS: &str = "keygate_rate_limit_windows";
    pub const RATE_LIMIT_PURGED_TOTAL: &str = "keygate_rate_limit_purged_total";
}

/// Initialize the Prometheus metrics exporter.
///
/// # Arguments
///
/// * `metrics_addr` - Address for the Prometheus metrics endpoint
///
/// # Returns
///
/// `Ok(())` if initialization succeeds, `Err` with message otherwise.
pub fn init_metrics(metrics_addr: SocketAddr) -> Result<(), String> {
    PrometheusBuilder::new()
        .with_http_listener(metrics_addr)
        .install()
        .map_err(|e| format!("Failed to install Prometheus exporter: {e}"))?;

    describe_counter!(
        names::REQUESTS_TOTAL,
        "Protected requests evaluated by the gateway, by outcome and deciding stage"
    );
    describe_counter!(
        names::RATE_LIMIT_PURGED_TOTAL,
        "Total number of idle rate-limit windows purged"
    );
    describe_histogram!(
        names::CHECK_DURATION_SECONDS,
        "Gateway pipeline evaluation time in seconds"
    );
    describe_gauge!(
        names::RATE_LIMIT_WINDOWS,
        "Rate-limit windows currently held in memory"
    );

    info!(addr = %metrics_addr, "Prometheus metrics endpoint started");
    Ok(())
}

/// Try to initialize metrics, logging any errors but not failing.
pub fn try_init_metrics(metrics_addr: SocketAddr) {
    if let Err(e) = init_metrics(metrics_addr) {
        error!(error = %e, "Failed to initialize metrics, continuing without metrics");
    }
}

/// Record one gateway decision and how long it took.
///
/// `stage` is the stage that denied the request, or `"complete"` when every
/// stage passed. `code` is `200` for allowed requests.
pub fn record_decision(outcome: &'static str, stage: &'static str, code: i32, duration_secs: f64) {
    counter!(names::REQUESTS_TOTAL, "outcome" => outcome, "stage" => stage, "code" => code.to_string())
        .increment(1);
    histogram!(names::CHECK_DURATION_SECONDS, "outcome" => outcome).record(duration_secs);
}

/// Record the result of an idle-window purge.
pub fn record_purge(purged: usize, remaining: usize) {
    counter!(names::RATE_LIMIT_PURGED_TOTAL).increment(purged as u64);
    gauge!(names::RATE_LIMIT_WINDOWS).set(remaining as f64);
}
