use std::net::SocketAddr;
use std::sync::Arc;

use poser_api::config::ServerConfig;
use poser_api::engine::run_log::{DisabledRunLog, PgRunLog, RunLog};
use poser_api::engine::runner::GenerationRunner;
use poser_api::router::build_app_router;
use poser_api::state::AppState;
use poser_comfyui::executor::WorkflowExecutor;
use poser_core::template_store::TemplateStore;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "poser_api=debug,poser_comfyui=debug,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(
        host = %config.host,
        port = %config.port,
        comfyui_url = %config.comfyui_url,
        workflows_dir = %config.workflows_dir,
        "Loaded server configuration",
    );

    // --- Run log ---
    let run_log: Arc<dyn RunLog> = match &config.database_url {
        Some(database_url) => {
            let pool = poser_db::create_pool(database_url)
                .await
                .expect("Failed to connect to database");
            tracing::info!("Database connection pool created");

            poser_db::health_check(&pool)
                .await
                .expect("Database health check failed");

            poser_db::run_migrations(&pool)
                .await
                .expect("Failed to run database migrations");
            tracing::info!("Database migrations applied");

            Arc::new(PgRunLog::new(pool))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, run log and response cache disabled");
            Arc::new(DisabledRunLog)
        }
    };

    // --- Generation runner ---
    let executor = WorkflowExecutor::new(config.comfyui_url.clone(), config.comfyui_ws_url.clone());
    let templates = TemplateStore::new(&config.workflows_dir);
    let runner = Arc::new(GenerationRunner::new(executor, templates, run_log));

    // --- App state ---
    let state = AppState {
        config: Arc::new(config.clone()),
        runner,
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

    tracing::info!("Graceful shutdown complete");
}

/// Wait for SIGINT or SIGTERM to initiate graceful shutdown.
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
