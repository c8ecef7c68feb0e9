//! HTTP surface.
//!
//! One flat route table over a shared [`AppContext`]; every handler lives in
//! [`routes`]. The server owns the background reaper task and shuts down
//! gracefully on SIGINT/SIGTERM.

use crate::config::Config;
use crate::ops::Executor;
use crate::pipeline::Pipeline;
use crate::resolve::Resolver;
use crate::store::reaper::{start_reaper_task, Reaper};
use crate::store::ArtifactStore;
use anyhow::{Context, Result};
use axum::{
    http::{header, Method},
    routing::{delete, get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

pub mod error;
pub mod routes;

/// Shared application context
#[derive(Clone)]
pub struct AppContext {
    pub store: ArtifactStore,
    pub executor: Arc<Executor>,
    pub pipeline: Arc<Pipeline>,
    pub config: Arc<Config>,
}

impl AppContext {
    /// Wire up the full context from configuration.
    pub fn new(config: Config) -> Result<Self> {
        let store = ArtifactStore::new(&config.storage.root_dir)
            .context("Failed to initialize artifact store")?;
        let resolver = Arc::new(Resolver::new(store.clone(), &config));
        let executor = Arc::new(Executor::new(
            store.clone(),
            resolver.clone(),
            &config.ffmpeg,
        ));
        let pipeline = Arc::new(Pipeline::new(store.clone(), executor.clone(), &config));

        Ok(Self {
            store,
            executor,
            pipeline,
            config: Arc::new(config),
        })
    }
}

/// Create the Axum router with all routes
pub fn create_router(ctx: AppContext) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/health", get(routes::health))
        .route("/info", get(routes::info))
        .route("/merge", post(routes::merge))
        .route("/concat", post(routes::concat))
        .route("/add-subtitles", post(routes::add_subtitles))
        .route("/add-background-music", post(routes::add_background_music))
        .route("/resize", post(routes::resize))
        .route("/extract-audio", post(routes::extract_audio))
        .route("/thumbnail", post(routes::thumbnail))
        .route("/trim", post(routes::trim))
        .route("/normalize-audio", post(routes::normalize_audio))
        .route("/probe", post(routes::probe))
        .route("/full-pipeline", post(routes::full_pipeline))
        .route("/download/{job_id}/{filename}", get(routes::download))
        .route("/jobs/{job_id}/artifacts", get(routes::list_artifacts))
        .route("/cleanup/{job_id}", delete(routes::cleanup))
        .route("/cleanup-all", delete(routes::cleanup_all))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}

/// Start the HTTP server
pub async fn start_server(config: Config) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid server address")?;

    let sweep_interval = Duration::from_secs(config.storage.sweep_interval_secs);
    let retention = Duration::from_secs(config.storage.retention_secs);

    let ctx = AppContext::new(config)?;

    let reaper = Reaper::new(ctx.store.clone(), retention);
    start_reaper_task(reaper, sweep_interval);

    let app = create_router(ctx);

    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => {}
            Err(e) => {
                tracing::error!("Failed to install Ctrl+C handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
