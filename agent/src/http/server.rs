use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tracing::info;

use super::routes::{
    archive_log_directory, delete_data_directories, rename_directories, status, upgrade_primaries,
};
use crate::server::AgentServer;

fn router(server: Arc<AgentServer>) -> Router {
    Router::new()
        .route("/status", get(status::status))
        .route(
            "/archive_log_directory",
            post(archive_log_directory::archive_log_directory),
        )
        .route("/rename_directories", post(rename_directories::rename_directories))
        .route(
            "/delete_data_directories",
            post(delete_data_directories::delete_data_directories),
        )
        .route("/upgrade_primaries", post(upgrade_primaries::upgrade_primaries))
        .with_state(server)
}

/// Serve the agent API until the process is stopped.
pub async fn serve(server: Arc<AgentServer>, port: u16) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("bind agent API to {addr}"))?;

    info!("agent on host {} listening on {addr}", server.host());

    axum::serve(listener, router(server))
        .await
        .context("agent API server failed")
}
