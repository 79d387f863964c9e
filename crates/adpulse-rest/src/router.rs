//! Main application router.

use crate::{
    controllers::{health_controller, jobs_controller, metrics_controller},
    middleware::logging_middleware,
    state::AppState,
    ws,
};
use adpulse_config::{ObservabilityConfig, ServerConfig};
use axum::{
    error_handling::HandleErrorLayer,
    http::{HeaderValue, StatusCode},
    middleware,
    routing::get,
    BoxError, Router,
};
use tower::ServiceBuilder;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};

/// Creates the application router.
///
/// The request timeout covers HTTP routes only; `/ws` connections live as
/// long as the socket.
pub fn create_router(
    state: AppState,
    server_config: &ServerConfig,
    observability: &ObservabilityConfig,
) -> Router {
    let cors = create_cors_layer(server_config);

    let timeout = ServiceBuilder::new()
        .layer(HandleErrorLayer::new(|_: BoxError| async {
            StatusCode::REQUEST_TIMEOUT
        }))
        .timeout(server_config.request_timeout());

    let api_router = Router::new()
        .nest("/jobs", jobs_controller::router())
        .layer(timeout);

    let mut router = Router::new()
        .merge(health_controller::router())
        .nest("/api/v1", api_router)
        .route("/ws", get(ws::ws_handler));

    if observability.metrics_enabled {
        router = router.route(
            &observability.metrics_path,
            get(metrics_controller::metrics_handler),
        );
    }

    let router = router
        .route("/", get(root))
        .layer(CompressionLayer::new())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(logging_middleware))
        .with_state(state);

    info!("Router created with job endpoints and WebSocket at /ws");
    router
}

/// Creates a CORS layer based on server configuration.
fn create_cors_layer(server_config: &ServerConfig) -> CorsLayer {
    if !server_config.cors_enabled {
        return CorsLayer::new();
    }
    if server_config.cors_origins.iter().any(|origin| origin == "*") {
        return CorsLayer::permissive();
    }

    let origins: Vec<HeaderValue> = server_config
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Root endpoint handler.
async fn root() -> &'static str {
    "AdPulse API v1"
}
