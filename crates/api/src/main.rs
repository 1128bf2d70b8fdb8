use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use gifpress_api::config::ServerConfig;
use gifpress_api::engine::{self, JobRunner, Predictor, WorkerPool};
use gifpress_api::router::build_app_router;
use gifpress_api::state::AppState;
use gifpress_api::storage::ArtifactStore;
use gifpress_api::ws;

use gifpress_db::repositories::JobRepo;
use gifpress_events::EventBus;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gifpress_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = Arc::new(ServerConfig::from_env());
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    // --- Database ---
    if let Some(parent) = std::path::Path::new(&config.database_path).parent() {
        std::fs::create_dir_all(parent).expect("Failed to create database directory");
    }
    let pool = gifpress_db::create_pool(&config.database_path)
        .await
        .expect("Failed to open database");
    gifpress_db::init_schema(&pool)
        .await
        .expect("Failed to apply database schema");
    gifpress_db::health_check(&pool)
        .await
        .expect("Database health check failed");
    tracing::info!(path = %config.database_path, "Database ready");

    // --- Artifact store ---
    let store = Arc::new(ArtifactStore::new(
        config.upload_dir.clone(),
        config.output_dir.clone(),
    ));
    store
        .ensure_dirs()
        .await
        .expect("Failed to create artifact directories");

    // --- Event bus ---
    let event_bus = Arc::new(EventBus::default());

    // --- WebSocket manager + heartbeat + relay ---
    let ws_manager = Arc::new(ws::WsManager::new());
    let heartbeat_handle = ws::start_heartbeat(Arc::clone(&ws_manager));
    let relay_cancel = CancellationToken::new();
    let relay_handle = ws::start_relay(
        Arc::clone(&event_bus),
        Arc::clone(&ws_manager),
        relay_cancel.clone(),
    );

    // --- Predictor ---
    let predictor = Arc::new(Predictor::load(&config.baseline_model_path, pool.clone()));

    // --- Worker pool ---
    let runner = Arc::new(JobRunner::new(
        pool.clone(),
        Arc::clone(&event_bus),
        Arc::clone(&store),
        Arc::clone(&predictor),
        Arc::clone(&config),
    ));
    let worker_pool = WorkerPool::new(
        runner,
        Arc::clone(&event_bus),
        config.default_concurrency,
        config.max_concurrency,
    );
    let pool_cancel = CancellationToken::new();
    let pool_handle = worker_pool.start(pool_cancel.clone());

    // --- Startup reconciliation ---
    // Jobs left in `processing` by a dead process are unrecoverable; jobs
    // left in `queued` go back into the pool.
    let interrupted = JobRepo::fail_interrupted(&pool, Utc::now())
        .await
        .expect("Failed to reconcile interrupted jobs");
    if interrupted > 0 {
        tracing::warn!(interrupted, "Marked interrupted jobs as failed");
    }
    let queued = JobRepo::queued_ids(&pool)
        .await
        .expect("Failed to load queued jobs");
    if !queued.is_empty() {
        tracing::info!(count = queued.len(), "Re-enqueueing jobs from previous run");
        for job_id in queued {
            worker_pool.submit(job_id);
        }
    }

    // --- Reaper ---
    let reaper_cancel = CancellationToken::new();
    let reaper_handle = tokio::spawn(engine::reaper::run(
        pool.clone(),
        Arc::clone(&store),
        config.reaper_interval,
        reaper_cancel.clone(),
    ));

    // --- App state + router ---
    let state = AppState {
        pool,
        config: Arc::clone(&config),
        store,
        ws_manager: Arc::clone(&ws_manager),
        event_bus: Arc::clone(&event_bus),
        worker_pool: Arc::clone(&worker_pool),
    };
    let app = build_app_router(state, &config);

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

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");

    // Stop admitting new work; in-flight jobs finish on their own tasks.
    pool_cancel.cancel();
    let _ = tokio::time::timeout(Duration::from_secs(5), pool_handle).await;
    tracing::info!("Worker pool dispatcher stopped");

    reaper_cancel.cancel();
    let _ = tokio::time::timeout(Duration::from_secs(5), reaper_handle).await;
    tracing::info!("Reaper stopped");

    relay_cancel.cancel();
    let _ = tokio::time::timeout(Duration::from_secs(5), relay_handle).await;

    let ws_count = ws_manager.connection_count().await;
    tracing::info!(ws_count, "Closing remaining WebSocket connections");
    ws_manager.shutdown_all().await;

    heartbeat_handle.abort();
    tracing::info!("Graceful shutdown complete");
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix) so the server
/// shuts down cleanly whether stopped interactively or by a process
/// manager (e.g. systemd, Docker, Kubernetes).
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
