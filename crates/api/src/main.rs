use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use unistacker_api::background::task_reaper;
use unistacker_api::config::ServerConfig;
use unistacker_api::router::build_app_router;
use unistacker_api::state::AppState;
use unistacker_worker::{DriverSource, ScrapePipeline};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "unistacker_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    // --- Automation worker ---
    let command = config
        .driver
        .command
        .clone()
        .expect("DRIVER_COMMAND must be set");
    tracing::info!(command = %command, args = ?config.driver.args, "Using automation driver");
    let worker = Arc::new(ScrapePipeline::new(DriverSource::new(
        command,
        config.driver.args.clone(),
    )));

    // --- App state ---
    let state = AppState::new(config.clone(), worker);
    let registry = Arc::clone(&state.registry);
    tracing::info!(
        max_concurrent_jobs = config.tasks.max_concurrent_jobs,
        job_timeout_secs = config.tasks.job_timeout.as_secs(),
        "Job runner ready"
    );

    // --- Task reaper ---
    let reaper_cancel = CancellationToken::new();
    let reaper_handle = tokio::spawn(task_reaper::run(
        Arc::clone(&registry),
        config.tasks.retention,
        config.tasks.sweep_interval,
        reaper_cancel.clone(),
    ));

    // --- Router ---
    let app = build_app_router(state, &config);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, static_dir = %config.static_dir, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");

    reaper_cancel.cancel();
    let _ = tokio::time::timeout(Duration::from_secs(5), reaper_handle).await;
    tracing::info!("Task reaper stopped");

    let remaining = registry.task_count().await;
    let active = registry.active_count().await;
    if active > 0 {
        tracing::warn!(remaining, active, "Shutting down with unfinished tasks");
    } else {
        tracing::info!(remaining, "No unfinished tasks");
    }

    tracing::info!("Graceful shutdown complete");
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix).
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
