//! HTTP facade over the engine.

pub mod handlers;

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::routing::{get, post};
use axum::Router;
use tokio::signal;
use tracing::info;

use crate::core::Engine;

/// Shared handler state
#[derive(Debug, Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
}

pub fn build_app(state: AppState) -> Router {
    Router::new()
        .route("/status", get(handlers::status))
        .route("/backup", post(handlers::backup))
        .route("/restore", post(handlers::restore))
        .route("/backupList", post(handlers::backup_list))
        .route("/backupDelete", post(handlers::backup_delete))
        .route("/archive", post(handlers::archive))
        .route("/archiveList", post(handlers::archive_list))
        .route("/archiveDelete", post(handlers::archive_delete))
        .route("/pluginInfo/{name}/{type}", post(handlers::plugin_info))
        .route("/pluginList/{type}", get(handlers::plugin_list))
        .route(
            "/startBackupWorkflow/{profile}/{config}/{policy}",
            post(handlers::start_backup_workflow),
        )
        .route(
            "/startRestoreWorkflow/{profile}/{config}/{policy}/{workflow_id}",
            post(handlers::start_restore_workflow),
        )
        .with_state(state)
}

/// Serve until Ctrl+C or SIGTERM
pub async fn serve(engine: Arc<Engine>, port: u16) -> Result<()> {
    let app = build_app(AppState { engine });

    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!(addr = %addr, "Starting server");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;
    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
        _ = terminate => info!("Received SIGTERM, shutting down..."),
    }
}
