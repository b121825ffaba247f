//! Inbound notification endpoint
//!
//! The remote service calls `POST /api/data` when a job is ready. The
//! handler validates the payload, answers immediately, and runs the
//! download as its own task; the task's outcome is logged with the release
//! name so failures stay observable.

use crate::error::{Error, Result};
use crate::notification::{Notification, extract_release_name};
use crate::remote::ItemQuery;
use crate::supervisor::TransferSupervisor;
use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

/// Build the notification router.
pub fn create_router(supervisor: Arc<TransferSupervisor>) -> Router {
    Router::new()
        .route("/api/data", post(receive_notification))
        .route("/health", get(health_check))
        .with_state(supervisor)
        .layer(TraceLayer::new_for_http())
}

/// Bind the configured address and serve notifications until shutdown.
///
/// # Errors
///
/// Returns [`Error::Io`] when the listener cannot bind and
/// [`Error::Server`] when serving fails.
pub async fn start_server(
    supervisor: Arc<TransferSupervisor>,
    bind_address: SocketAddr,
) -> Result<()> {
    let listener = TcpListener::bind(bind_address).await.map_err(Error::Io)?;
    tracing::info!(address = %bind_address, "notification endpoint listening");

    axum::serve(listener, create_router(supervisor))
        .await
        .map_err(|e| Error::Server(e.to_string()))?;

    tracing::info!("notification endpoint stopped");
    Ok(())
}

async fn receive_notification(
    State(supervisor): State<Arc<TransferSupervisor>>,
    Json(notification): Json<Notification>,
) -> impl IntoResponse {
    let release = match extract_release_name(&notification.data.message) {
        Ok(release) => release,
        Err(e) => {
            tracing::warn!(
                kind = %notification.kind,
                error = %e,
                "discarding notification without release name"
            );
            return (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({ "message": "no release name in message" })),
            );
        }
    };

    tracing::info!(release = %release, "ready notification received");

    // One task per event; the dispatcher never blocks on the transfer
    tokio::spawn(async move {
        match supervisor
            .handle_ready(ItemQuery::ByName(release.clone()))
            .await
        {
            Ok(path) => {
                tracing::info!(release = %release, path = %path.display(), "download complete")
            }
            Err(e) => tracing::error!(release = %release, error = %e, "download failed"),
        }
    });

    (
        StatusCode::OK,
        Json(serde_json::json!({ "message": "Data received and processing started" })),
    )
}

async fn health_check() -> StatusCode {
    StatusCode::OK
}
