use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{error, info, warn};

use keygate::config::LogFormat;
use keygate::{AppState, Config, SystemClock, build_router, metrics, utils};

#[tokio::main]
async fn main() -> ExitCode {
    // LOG_FORMAT is read ahead of Config so configuration errors are logged
    let _ = dotenvy::dotenv();
    let log_format = LogFormat::from_env();
    utils::init_tracing(log_format.clone().unwrap_or_default());
    if let Err(e) = log_format {
        warn!("Invalid LOG_FORMAT ({e}), using pretty output");
    }

    info!("Starting keygate v{}", env!("CARGO_PKG_VERSION"));

    match run().await {
        Ok(()) => ExitCode::from(exitcode::OK as u8),
        Err(exit_code) => ExitCode::from(exit_code as u8),
    }
}

/// Run the application, returning an exit code on error.
async fn run() -> Result<(), exitcode::ExitCode> {
    // Load configuration
    let config = Config::from_env().map_err(|e| {
        error!("Configuration error: {e}");
        exitcode::CONFIG
    })?;
    info!(
        host = %config.host,
        port = %config.port,
        protected_prefix = %config.protected_path_prefix,
        keys = config.api_keys.len(),
        "Configuration loaded"
    );

    if let Some(metrics_addr) = config.metrics_addr() {
        metrics::try_init_metrics(metrics_addr);
    }

    // Build application state and router
    let state = AppState::new(config.clone(), Arc::new(SystemClock)).map_err(|e| {
        error!("Failed to build gateway: {e}");
        exitcode::CONFIG
    })?;
    let app = build_router(state.clone());

    // Start server
    let addr: SocketAddr = config.server_addr().parse().map_err(|e| {
        error!("Invalid server address: {e}");
        exitcode::CONFIG
    })?;
    let listener = TcpListener::bind(addr).await.map_err(|e| {
        error!("Failed to bind to {addr}: {e}");
        exitcode::UNAVAILABLE
    })?;

    let prefix = config.protected_path_prefix.trim_end_matches('/');
    info!("Server listening on http://{addr}");
    info!("API endpoints:");
    info!("  GET  /health             - Public health check");
    info!("  GET  {prefix}/health - Authenticated health check");
    info!("  GET  {prefix}/whoami - Caller identity");

    // Peer addresses feed client IP resolution when no proxy headers are set
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(utils::shutdown_signal())
    .await
    .map_err(|e| {
        error!("Server error: {e}");
        exitcode::SOFTWARE
    })?;

    // Gracefully shutdown background tasks
    info!("HTTP server stopped, shutting down background tasks...");
    state.shutdown().await;

    info!("Server shutdown complete");
    Ok(())
}
