use std::net::SocketAddr;

use anyhow::{Context, Result};
use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tracing::info;

mod auth;
mod error;
mod handlers;
pub mod types;

pub use auth::{OperatorGate, OPERATOR_TOKEN_HEADER};
pub use error::{status_for, ApiError, ErrorBody};
pub use handlers::default_filename;

use crate::state::AppState;

/// All routes live under `/ai-images` and sit behind the operator gate.
pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/generate", post(handlers::generate_image))
        .route("/save", post(handlers::save_image))
        .route("/storages", get(handlers::list_storages))
        .route("/folders", get(handlers::list_folders))
        .route("/fields", get(handlers::list_fields))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_operator,
        ));
    Router::new().nest("/ai-images", api).with_state(state)
}

pub async fn serve(state: AppState, bind: SocketAddr) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("failed to bind {bind}"))?;
    info!(addr = %bind, "artgen listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;
    info!("artgen stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %err, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}
