//! HTTP route handlers: health/readiness probes and the WebSocket route.
//!
//! All handlers are thin - they delegate to services for business logic.

use axum::{routing::get, Json, Router};
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::api::ws::ws_handler;
use crate::api::AppState;
use crate::protocol_constants::APP_NAME;

/// Creates the Axum router with all routes.
///
/// CORS is permissive: clients are lecture-hall browsers on arbitrary
/// origins, and the WebSocket itself carries no credentials.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(health_check))
        .route("/readyz", get(readiness_check))
        .route("/ws/transcribe", get(ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Liveness probe: "Is the process running?"
///
/// Always returns 200 OK if the server is responding. Use `/readyz` for
/// readiness checks that verify the ASR provider is actually reachable.
async fn health_check() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "service": APP_NAME,
    }))
}

/// Readiness probe: "Can the service accept new sessions?"
///
/// Returns 503 once the registry is at `SESSION_MAX`, so a load balancer
/// routes new lecture connections elsewhere. Provider credentials were
/// already validated at startup; they are not re-verified per call.
async fn readiness_check(
    axum::extract::State(state): axum::extract::State<AppState>,
) -> impl axum::response::IntoResponse {
    let active = state.session_registry.active_count();
    let max = state.config.session_max;
    let at_capacity = state.session_registry.at_capacity();
    let status = if at_capacity {
        axum::http::StatusCode::SERVICE_UNAVAILABLE
    } else {
        axum::http::StatusCode::OK
    };
    (
        status,
        Json(json!({
            "status": if at_capacity { "at_capacity" } else { "ready" },
            "sessions": {
                "active": active,
                "max": max,
            }
        })),
    )
}
