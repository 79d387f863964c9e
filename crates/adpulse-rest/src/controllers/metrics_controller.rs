//! Prometheus scrape endpoint.

use crate::state::AppState;
use axum::{extract::State, http::StatusCode, response::IntoResponse};

/// Renders the Prometheus text format, or 404 when no recorder is installed.
pub async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    match &state.metrics {
        Some(handle) => (StatusCode::OK, handle.render()).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}
