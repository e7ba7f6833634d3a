//! HTTP handlers for territory-service.

pub mod checkout;
pub mod claims;
pub mod counties;
pub mod debug;
pub mod offers;
pub mod portal;
pub mod trials;
pub mod webhooks;

use crate::services::metrics::get_metrics;
use crate::AppState;
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    match state.db.health_check().await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({ "status": "ok", "service": "territory-service" })),
        ),
        Err(e) => {
            tracing::error!(error = %e, "Health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "unavailable", "service": "territory-service" })),
            )
        }
    }
}

pub async fn metrics() -> impl IntoResponse {
    (StatusCode::OK, get_metrics())
}
