use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

use crate::middleware::ApiResponse;
use crate::state::AppState;

/// GET / - Service name and version
pub async fn root_get() -> impl IntoResponse {
    ApiResponse::success(json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// GET /health - 200 while the store answers, 503 otherwise
pub async fn health_get(State(state): State<AppState>) -> impl IntoResponse {
    match state.store.ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({ "status": "ok", "version": env!("CARGO_PKG_VERSION") })),
        ),
        Err(e) => {
            tracing::error!("Health check failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "degraded", "version": env!("CARGO_PKG_VERSION") })),
            )
        }
    }
}
