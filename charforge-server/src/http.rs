//! Charforge HTTP API
//!
//! Axum server exposing the same event surface as the IPC socket, for
//! gateways that prefer HTTP and for the CLI.
//!
//! Each endpoint is a thin axum handler over an inner function that takes the
//! state directly, so the logic is testable without axum dispatch.
//!
//! Endpoints:
//! - GET  /health: liveness plus storage status
//! - GET  /version: server version info
//! - POST /events: any gateway event (tagged by `action`)
//! - GET  /worldviews: worldview names
//! - GET  /worldviews/:name: one worldview's description

use std::sync::Arc;

use anyhow::Result;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use charforge_core::ipc::{CharforgeRequest, CharforgeResponse, PROTOCOL_VERSION};
use tokio::net::TcpListener;
use tokio::sync::broadcast;

use crate::router::{self, AppState};

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/version", get(version_handler))
        .route("/events", post(events_handler))
        .route("/worldviews", get(list_worldviews_handler))
        .route("/worldviews/:name", get(view_worldview_handler))
        .with_state(state)
}

/// Serve on the configured address until the shutdown broadcast fires.
pub async fn start_http_server(
    state: Arc<AppState>,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<()> {
    let addr = format!("{}:{}", state.config.http.host, state.config.http.port);
    let app = build_router(state);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Charforge HTTP API listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
            tracing::info!("HTTP server shutting down...");
        })
        .await?;

    Ok(())
}

// ============================================================================
// Inner (directly testable) functions
// ============================================================================

pub async fn health_inner(state: &AppState) -> (StatusCode, serde_json::Value) {
    let response = router::handle_request(CharforgeRequest::Health, state).await;
    if response.is_ok() {
        let mut data = response.data.unwrap_or_else(|| serde_json::json!({}));
        if let Some(obj) = data.as_object_mut() {
            obj.insert("version".to_string(), serde_json::json!(env!("CARGO_PKG_VERSION")));
            obj.insert(
                "socket".to_string(),
                serde_json::json!(state.config.service.socket_path),
            );
        }
        (StatusCode::OK, data)
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            serde_json::json!({
                "status": "unhealthy",
                "error": response.error,
            }),
        )
    }
}

pub fn version_inner() -> serde_json::Value {
    serde_json::json!({
        "version": env!("CARGO_PKG_VERSION"),
        "protocol": PROTOCOL_VERSION,
    })
}

/// Run one event and pair the response with an HTTP status.
/// The body is always the full response so the caller gets the reply text.
pub async fn event_inner(
    state: &AppState,
    request: CharforgeRequest,
) -> (StatusCode, CharforgeResponse) {
    let response = router::handle_request(request, state).await;
    (status_for(&response), response)
}

// ============================================================================
// Axum handlers
// ============================================================================

pub async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let (status, body) = health_inner(&state).await;
    (status, Json(body))
}

pub async fn version_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(version_inner()))
}

pub async fn events_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CharforgeRequest>,
) -> impl IntoResponse {
    let (status, body) = event_inner(&state, request).await;
    (status, Json(body))
}

pub async fn list_worldviews_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let (status, body) = event_inner(&state, CharforgeRequest::ListWorldviews).await;
    (status, Json(body))
}

pub async fn view_worldview_handler(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> impl IntoResponse {
    let (status, body) = event_inner(&state, CharforgeRequest::ViewWorldview { name }).await;
    (status, Json(body))
}

// ============================================================================
// Helpers
// ============================================================================

/// HTTP status for a router response, keyed on the error kind.
pub fn status_for(response: &CharforgeResponse) -> StatusCode {
    if response.is_ok() {
        return StatusCode::OK;
    }
    match response.error.as_deref() {
        Some("session_conflict" | "worldview_exists" | "duplicate_profile_name") => {
            StatusCode::CONFLICT
        }
        Some(
            "no_active_session" | "no_pending_profile" | "profile_not_found"
            | "worldview_not_found",
        ) => StatusCode::NOT_FOUND,
        Some(
            "unknown_worldview" | "empty_message" | "transcript_empty" | "invalid_name",
        ) => StatusCode::UNPROCESSABLE_ENTITY,
        Some("generation_failed" | "delivery_unreachable") => StatusCode::BAD_GATEWAY,
        Some("storage") => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
