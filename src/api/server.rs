use std::sync::Arc;

use axum::{Router, extract::DefaultBodyLimit, routing::get};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::info;

use super::{
    services::{forward_upload, health, status},
    state::AppState,
};
use crate::artifacts::{ArtifactManager, CleanupScheduler};
use crate::config::Config;
use crate::forward::Forwarder;

type AnyError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Builds the gateway router around a prepared state
pub fn router(state: AppState) -> Router {
    let body_limit = state.config.server.max_body_bytes.as_usize();

    Router::new()
        .route("/", get(status).post(forward_upload))
        .route("/health", get(health))
        .with_state(state)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
}

/// Creates the artifact manager for `config`, tying deferred cleanups to
/// `shutdown`.
pub fn artifact_manager(config: &Config, shutdown: CancellationToken) -> Arc<ArtifactManager> {
    let scheduler = CleanupScheduler::new(config.pipeline.cleanup_delay(), shutdown);
    Arc::new(ArtifactManager::new(
        config.server.temp_dir.clone(),
        config.archive.clone(),
        scheduler,
    ))
}

pub async fn run(config: Config) -> Result<(), AnyError> {
    let address = config.server.bind_addr();

    let shutdown = CancellationToken::new();
    let artifacts = artifact_manager(&config, shutdown.clone());
    info!(path = %artifacts.temp_dir().display(), "Preparing temp directory");
    artifacts
        .prepare()
        .await
        .map_err(|e| format!("Failed to prepare temp directory: {}", e))?;

    let client = reqwest::Client::builder()
        .build()
        .map_err(|e| format!("Failed to build HTTP client: {}", e))?;

    info!(
        profiles = config.profiles.len(),
        max_concurrent_encoders = config.pipeline.max_concurrent_encoders.max(1),
        "Encoding pipeline ready"
    );

    let state = AppState::new(config, Arc::clone(&artifacts), Forwarder::new(client));
    let app = router(state);

    let listener = TcpListener::bind(address).await?;
    info!(%address, "Re-encoding gateway listening");

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Run whatever cleanup is still waiting out its delay
    artifacts.shutdown().await;
    info!("Shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
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

    info!("Shutdown signal received");
}
