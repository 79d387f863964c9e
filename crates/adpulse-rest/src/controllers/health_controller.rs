//! Health check controller.

use crate::state::AppState;
use adpulse_hub::HubStats;
use axum::{
    extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router,
};
use serde::Serialize;
use tracing::warn;

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub hub: HubStats,
}

/// Readiness of each backing service.
#[derive(Debug, Serialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    pub database: Option<bool>,
    pub redis: Option<bool>,
}

/// Creates the health router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/live", get(liveness_check))
}

pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        hub: state.hub.stats(),
    })
}

/// Ready when the database and Redis answer. Unconfigured checks are skipped.
pub async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    let database = match &state.database {
        Some(pool) => Some(match pool.health_check().await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "Database readiness check failed");
                false
            }
        }),
        None => None,
    };

    let redis = match &state.redis {
        Some(pool) => Some(ping_redis(pool).await),
        None => None,
    };

    let ready = database.unwrap_or(true) && redis.unwrap_or(true);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        status,
        Json(ReadinessResponse {
            ready,
            database,
            redis,
        }),
    )
}

pub async fn liveness_check() -> impl IntoResponse {
    StatusCode::OK
}

async fn ping_redis(pool: &deadpool_redis::Pool) -> bool {
    let mut conn = match pool.get().await {
        Ok(conn) => conn,
        Err(e) => {
            warn!(error = %e, "Redis readiness check failed");
            return false;
        }
    };
    match redis::cmd("PING").query_async::<String>(&mut *conn).await {
        Ok(_) => true,
        Err(e) => {
            warn!(error = %e, "Redis readiness check failed");
            false
        }
    }
}
