use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use trellis_api::config::ServerConfig;
use trellis_api::engine::sweeper;
use trellis_api::router::build_app_router;
use trellis_api::state::AppState;
use trellis_pipeline::ScriptPipeline;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    let json_logs = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "trellis_api=debug,trellis_pipeline=debug,tower_http=debug".into()
            }),
        )
        .with(json_logs.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json_logs).then(|| tracing_subscriber::fmt::layer()))
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(
        host = %config.host,
        port = config.port,
        input_dir = %config.input_dir.display(),
        output_dir = %config.output_dir.display(),
        public_base_url = %config.public_base_url,
        max_concurrent_executions = config.max_concurrent_executions,
        "Loaded server configuration",
    );

    std::fs::create_dir_all(&config.input_dir).expect("Failed to create INPUT_DIR");
    std::fs::create_dir_all(&config.output_dir).expect("Failed to create OUTPUT_DIR");

    // --- Engine ---
    let pipeline = Arc::new(ScriptPipeline::new(config.pipeline.clone()));
    let state = AppState::new(config.clone(), pipeline);

    // Optional expiry of finished jobs.
    let sweeper_cancel = CancellationToken::new();
    let sweeper_handle = (config.job_ttl_secs > 0).then(|| {
        tokio::spawn(sweeper::run(
            Arc::clone(&state.jobs),
            Duration::from_secs(config.job_ttl_secs),
            Duration::from_secs(config.job_sweep_interval_secs),
            sweeper_cancel.clone(),
        ))
    });

    // --- Router ---
    let app = build_app_router(state.clone());

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // --- Drain ---
    tracing::info!("HTTP server stopped, draining job runner");

    sweeper_cancel.cancel();
    if let Some(handle) = sweeper_handle {
        let _ = tokio::time::timeout(Duration::from_secs(5), handle).await;
    }

    state.shutdown().await;

    tracing::info!("Graceful shutdown complete");
}

/// Resolves on SIGINT, or SIGTERM on Unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
